//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 区分三类数据/结构错误与一类编程错误，调用方据此判断“该类型根本不能解码”还是“这份报文格式有误”；
//! - 每个变体都携带出问题的类型与成员，嵌套失败通过 [`CodecError::Nested`] 保留完整路径。
//!
//! ## 设计要求（What）
//! - [`SchemaError`]：构建规格时发现的结构性违规，对该类型是致命的，修复元数据前不会自愈；
//! - [`DecodeError`] / [`EncodeError`]：单次调用、与数据相关的失败；
//! - [`UsageError`]：在只写编解码器上解码、类型不匹配等调用方错误；
//! - 所有错误实现 `thiserror::Error`，并提供 `<域>.<语义>` 形式的稳定错误码（见 [`codes`]）。

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::types::TypeDescriptor;

/// 用户回调（构造器、访问器）返回的装箱错误。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 稳定错误码，供日志与指标聚合使用。
pub mod codes {
    /// 多个构造器带 `Read` 标签。
    pub const SCHEMA_MULTIPLE_CONSTRUCTORS: &str = "codec.schema.multiple_constructors";
    /// 构造参数缺少绑定标签。
    pub const SCHEMA_UNBOUND_PARAMETER: &str = "codec.schema.unbound_parameter";
    /// 构造参数带多个绑定标签。
    pub const SCHEMA_AMBIGUOUS_PARAMETER: &str = "codec.schema.ambiguous_parameter";
    /// 访问器带多个编码标签。
    pub const SCHEMA_CONFLICTING_ACCESSOR: &str = "codec.schema.conflicting_accessor";
    /// 编码访问器声明返回 `Void`。
    pub const SCHEMA_VOID_ACCESSOR: &str = "codec.schema.void_accessor";
    /// `WriteAs` 名称重复。
    pub const SCHEMA_DUPLICATE_NAME: &str = "codec.schema.duplicate_name";
    /// 成员类型中的类型变量无法解析。
    pub const SCHEMA_UNRESOLVED_VARIABLE: &str = "codec.schema.unresolved_variable";
    /// 泛型实参个数不符。
    pub const SCHEMA_TYPE_ARITY: &str = "codec.schema.type_arity";
    /// 输入树形状不符。
    pub const DECODE_UNEXPECTED_SHAPE: &str = "codec.decode.unexpected_shape";
    /// 构造器调用失败。
    pub const DECODE_CONSTRUCTION: &str = "codec.decode.construction";
    /// 合并访问器的结果不是对象。
    pub const ENCODE_MERGE_NOT_OBJECT: &str = "codec.encode.merge_not_object";
    /// 合并键冲突。
    pub const ENCODE_MERGE_COLLISION: &str = "codec.encode.merge_collision";
    /// 访问器调用失败。
    pub const ENCODE_ACCESSOR: &str = "codec.encode.accessor";
    /// 非有限浮点数没有树表示。
    pub const ENCODE_NON_FINITE: &str = "codec.encode.non_finite";
    /// 在只写编解码器上解码。
    pub const USAGE_WRITE_ONLY: &str = "codec.usage.write_only";
    /// 在只读编解码器上编码。
    pub const USAGE_READ_ONLY: &str = "codec.usage.read_only";
    /// 没有任何来源能处理该类型。
    pub const USAGE_UNSUPPORTED: &str = "codec.usage.unsupported";
    /// 实例类型与描述符不符。
    pub const USAGE_TYPE_MISMATCH: &str = "codec.usage.type_mismatch";
    /// 进程级注册中心重复安装。
    pub const USAGE_GLOBAL_INSTALLED: &str = "codec.usage.global_installed";
    /// 同一线程在构建中再次请求同一类型。
    pub const USAGE_RECURSIVE_BUILD: &str = "codec.usage.recursive_build";
    /// 文本不是合法的树。
    pub const SYNTAX: &str = "codec.syntax";
}

/// 错误大类，穿透 [`CodecError::Nested`] 取最内层的分类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 元数据结构性错误。
    Schema,
    /// 解码数据错误。
    Decode,
    /// 编码数据错误。
    Encode,
    /// 调用方使用错误。
    Usage,
    /// 文本语法错误。
    Syntax,
}

fn join(items: &[Arc<str>]) -> String {
    items.join(", ")
}

fn on_parameter(parameter: &Option<Arc<str>>) -> String {
    match parameter {
        Some(name) => format!(" on parameter `{name}`"),
        None => String::new(),
    }
}

/// 元数据违反结构约束，在首次构建该类型的规格时抛出。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// 多个构造器带 `Read` 标签，`constructors` 列出全部候选签名。
    #[error(
        "at most one constructor of `{ty}` may be tagged `Read`, {} given: {}",
        .constructors.len(),
        join(.constructors)
    )]
    MultipleDecodeConstructors {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 全部带 `Read` 标签的构造器签名。
        constructors: Vec<Arc<str>>,
    },

    /// 构造参数既没有 `ReadAs` 也没有 `ReadAsRoot`。
    #[error(
        "parameter #{index} of `Read` constructor `{constructor}` of `{ty}` must be tagged either `ReadAs` or `ReadAsRoot`"
    )]
    UnboundParameter {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 构造器签名。
        constructor: Arc<str>,
        /// 参数位置。
        index: usize,
    },

    /// 构造参数带多个绑定标签。
    #[error(
        "parameter #{index} of `Read` constructor `{constructor}` of `{ty}` carries more than one binding: {}",
        .tags.join(", ")
    )]
    AmbiguousParameter {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 构造器签名。
        constructor: Arc<str>,
        /// 参数位置。
        index: usize,
        /// 参数上的全部标签。
        tags: Vec<String>,
    },

    /// 访问器带多个编码标签。
    #[error(
        "accessors of `{ty}` must be tagged either `WriteAs` or `MergeWithRoot`, conflicting tags found on: {}",
        join(.accessors)
    )]
    ConflictingAccessorBinding {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 涉及的访问器。
        accessors: Vec<Arc<str>>,
    },

    /// 编码访问器声明返回 `Void`。
    #[error("encoding accessors of `{ty}` must return a value, void found on: {}", join(.accessors))]
    VoidAccessor {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 涉及的访问器。
        accessors: Vec<Arc<str>>,
    },

    /// 两个访问器使用同一个 `WriteAs` 名称。
    #[error("`WriteAs` name `{name}` of `{ty}` is used by both `{first}` and `{second}`")]
    DuplicateAccessorName {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 重复的 `WriteAs` 名称。
        name: Arc<str>,
        /// 先登记的访问器。
        first: Arc<str>,
        /// 后登记的访问器。
        second: Arc<str>,
    },

    /// 成员类型引用了宿主未声明的类型变量。
    #[error("type variable `{variable}` used by `{member}` of `{ty}` cannot be resolved")]
    UnresolvedTypeVariable {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 引用该变量的成员。
        member: String,
        /// 变量名。
        variable: Arc<str>,
    },

    /// 描述符实参个数与元数据声明的类型形参个数不符。
    #[error("`{ty}` declares {expected} type parameter(s) but was instantiated with {actual}")]
    TypeArity {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 元数据声明的类型形参个数。
        expected: usize,
        /// 描述符携带的实参个数。
        actual: usize,
    },
}

impl SchemaError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::MultipleDecodeConstructors { .. } => codes::SCHEMA_MULTIPLE_CONSTRUCTORS,
            SchemaError::UnboundParameter { .. } => codes::SCHEMA_UNBOUND_PARAMETER,
            SchemaError::AmbiguousParameter { .. } => codes::SCHEMA_AMBIGUOUS_PARAMETER,
            SchemaError::ConflictingAccessorBinding { .. } => codes::SCHEMA_CONFLICTING_ACCESSOR,
            SchemaError::VoidAccessor { .. } => codes::SCHEMA_VOID_ACCESSOR,
            SchemaError::DuplicateAccessorName { .. } => codes::SCHEMA_DUPLICATE_NAME,
            SchemaError::UnresolvedTypeVariable { .. } => codes::SCHEMA_UNRESOLVED_VARIABLE,
            SchemaError::TypeArity { .. } => codes::SCHEMA_TYPE_ARITY,
        }
    }

    /// 出问题的类型。
    pub fn descriptor(&self) -> &TypeDescriptor {
        match self {
            SchemaError::MultipleDecodeConstructors { ty, .. }
            | SchemaError::UnboundParameter { ty, .. }
            | SchemaError::AmbiguousParameter { ty, .. }
            | SchemaError::ConflictingAccessorBinding { ty, .. }
            | SchemaError::VoidAccessor { ty, .. }
            | SchemaError::DuplicateAccessorName { ty, .. }
            | SchemaError::UnresolvedTypeVariable { ty, .. }
            | SchemaError::TypeArity { ty, .. } => ty,
        }
    }
}

/// 输入树的形状不符，或构造器调用失败。
#[derive(Debug, Error)]
pub enum DecodeError {
    /// 输入节点的种类不是期望的种类。
    #[error("`{ty}` can be decoded only from {expected}, {actual} given")]
    UnexpectedShape {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 期望的节点种类。
        expected: &'static str,
        /// 实际的节点种类。
        actual: &'static str,
    },

    /// 构造器返回错误；取参失败时 `parameter` 指明参数。
    #[error(
        "constructor `{constructor}` of `{ty}` failed{}: {source}",
        on_parameter(.parameter)
    )]
    Construction {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 构造器签名。
        constructor: Arc<str>,
        /// 取参失败的参数。
        parameter: Option<Arc<str>>,
        /// 底层错误。
        #[source]
        source: BoxError,
    },
}

impl DecodeError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::UnexpectedShape { .. } => codes::DECODE_UNEXPECTED_SHAPE,
            DecodeError::Construction { .. } => codes::DECODE_CONSTRUCTION,
        }
    }
}

/// 合并冲突中先占用键的一方。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Contender {
    /// 同类型上以 `WriteAs` 声明的具名访问器。
    Named {
        /// 访问器名称。
        accessor: Arc<str>,
    },
    /// 本次编码中更早拼接的 `MergeWithRoot` 访问器。
    Merged {
        /// 访问器名称。
        accessor: Arc<str>,
    },
}

impl fmt::Display for Contender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contender::Named { accessor } => write!(f, "named accessor `{accessor}`"),
            Contender::Merged { accessor } => write!(f, "merged accessor `{accessor}`"),
        }
    }
}

/// 合并访问器的输出形状不符、键冲突，或访问器本身失败。
#[derive(Debug, Error)]
pub enum EncodeError {
    /// 合并访问器的结果不是对象。
    #[error(
        "`MergeWithRoot` accessor `{accessor}` of `{ty}` must produce an object, produced {value}"
    )]
    MergeNotObject {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 出错的访问器。
        accessor: Arc<str>,
        /// 合并访问器编码出的值。
        value: Value,
    },

    /// 合并进来的键已被占用。
    #[error(
        "`MergeWithRoot` accessor `{accessor}` of `{ty}` produced key `{key}` already taken by {contender}"
    )]
    MergeKeyCollision {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 冲突的键。
        key: String,
        /// 出错的访问器。
        accessor: Arc<str>,
        /// 先占用该键的一方。
        contender: Contender,
    },

    /// 访问器自身返回错误。
    #[error("accessor `{accessor}` of `{ty}` failed: {source}")]
    Accessor {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 出错的访问器。
        accessor: Arc<str>,
        /// 底层错误。
        #[source]
        source: BoxError,
    },

    /// `NaN` 或无穷没有树表示。
    #[error("`{ty}` cannot encode non-finite number {value}")]
    NonFinite {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 无法编码的值。
        value: f64,
    },
}

impl EncodeError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            EncodeError::MergeNotObject { .. } => codes::ENCODE_MERGE_NOT_OBJECT,
            EncodeError::MergeKeyCollision { .. } => codes::ENCODE_MERGE_COLLISION,
            EncodeError::Accessor { .. } => codes::ENCODE_ACCESSOR,
            EncodeError::NonFinite { .. } => codes::ENCODE_NON_FINITE,
        }
    }
}

/// 调用方使用方式错误，与报文内容无关。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// 类型没有 `Read` 构造器。
    #[error("write-only codec used for decode: `{ty}` has no `Read` constructor")]
    WriteOnly {
        /// 出问题的类型。
        ty: TypeDescriptor,
    },

    /// 类型没有编码声明。
    #[error("read-only codec used for encode: `{ty}` is not tagged `Write`")]
    ReadOnly {
        /// 出问题的类型。
        ty: TypeDescriptor,
    },

    /// 查找链上没有来源处理该类型。
    #[error("no codec source can handle `{ty}`")]
    Unsupported {
        /// 出问题的类型。
        ty: TypeDescriptor,
    },

    /// 实例不是编解码器期望的 Rust 类型。
    #[error("codec for `{ty}` expected a `{expected}` instance")]
    TypeMismatch {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 期望的 Rust 类型名。
        expected: &'static str,
    },

    /// 进程级注册中心已安装。
    #[error("a process-wide codec registry is already installed")]
    GlobalAlreadyInstalled,

    /// 构建期间同一线程再次请求正在构建的类型。
    #[error("building the codec for `{ty}` requested `{ty}` again on the same thread")]
    RecursiveBuild {
        /// 出问题的类型。
        ty: TypeDescriptor,
    },
}

impl UsageError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            UsageError::WriteOnly { .. } => codes::USAGE_WRITE_ONLY,
            UsageError::ReadOnly { .. } => codes::USAGE_READ_ONLY,
            UsageError::Unsupported { .. } => codes::USAGE_UNSUPPORTED,
            UsageError::TypeMismatch { .. } => codes::USAGE_TYPE_MISMATCH,
            UsageError::GlobalAlreadyInstalled => codes::USAGE_GLOBAL_INSTALLED,
            UsageError::RecursiveBuild { .. } => codes::USAGE_RECURSIVE_BUILD,
        }
    }
}

/// 引擎对外暴露的统一错误。
///
/// # 契约说明（What）
/// - `Nested` 记录失败发生在哪个类型的哪个成员上，可多层嵌套；
/// - [`kind`](Self::kind) 与 [`code`](Self::code) 总是取最内层错误，外层仅补充路径。
#[derive(Debug, Error)]
pub enum CodecError {
    /// 元数据结构性错误。
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// 解码数据错误。
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// 编码数据错误。
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// 调用方使用错误。
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// 文本解析或序列化失败。
    #[error("malformed tree text: {0}")]
    Syntax(#[from] serde_json::Error),

    /// `ty` 的成员 `member` 内部失败。
    #[error("in `{member}` of `{ty}`: {source}")]
    Nested {
        /// 出问题的类型。
        ty: TypeDescriptor,
        /// 失败所在的成员：参数键名、访问器名或列表下标。
        member: Arc<str>,
        /// 底层错误。
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    pub(crate) fn nested(ty: &TypeDescriptor, member: &Arc<str>, source: CodecError) -> Self {
        CodecError::Nested {
            ty: ty.clone(),
            member: member.clone(),
            source: Box::new(source),
        }
    }

    /// 剥离所有 `Nested` 外壳后的根因。
    pub fn root_cause(&self) -> &CodecError {
        let mut current = self;
        while let CodecError::Nested { source, .. } = current {
            current = &**source;
        }
        current
    }

    /// 最内层错误的大类。
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Schema(_) => ErrorKind::Schema,
            CodecError::Decode(_) => ErrorKind::Decode,
            CodecError::Encode(_) => ErrorKind::Encode,
            CodecError::Usage(_) => ErrorKind::Usage,
            CodecError::Syntax(_) => ErrorKind::Syntax,
            CodecError::Nested { source, .. } => source.kind(),
        }
    }

    /// 最内层错误的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::Schema(err) => err.code(),
            CodecError::Decode(err) => err.code(),
            CodecError::Encode(err) => err.code(),
            CodecError::Usage(err) => err.code(),
            CodecError::Syntax(_) => codes::SYNTAX,
            CodecError::Nested { source, .. } => source.code(),
        }
    }

    /// 从外到内的成员路径，例如 `["value", "firstName"]`。
    pub fn path(&self) -> Vec<Arc<str>> {
        let mut path = Vec::new();
        let mut current = self;
        while let CodecError::Nested { member, source, .. } = current {
            path.push(member.clone());
            current = &**source;
        }
        path
    }
}

/// 构造器从 [`Args`](crate::metadata::Args) 取参失败。
///
/// 解码器会识别该错误，把失败归因到具体参数。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("argument #{index} (`{label}`): {kind}")]
pub struct ArgError {
    /// 参数位置。
    pub index: usize,
    /// 参数的诊断名称。
    pub label: Arc<str>,
    /// 失败原因。
    pub kind: ArgErrorKind,
}

/// [`ArgError`] 的失败原因。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgErrorKind {
    /// 位置超出参数表。
    #[error("no such parameter")]
    OutOfRange,
    /// 参数为空，或已被取出。
    #[error("value is null or was already taken")]
    Missing,
    /// 参数不是请求的类型。
    #[error("expected a `{expected}` value")]
    TypeMismatch {
        /// 请求的 Rust 类型名。
        expected: &'static str,
    },
    /// 列表中出现空元素。
    #[error("list element #{position} is null")]
    NullElement {
        /// 空元素的下标。
        position: usize,
    },
}

/// 访问器收到的宿主实例不是注册时声明的类型。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("accessor owner is not a `{expected}`")]
pub struct InstanceMismatch {
    /// 访问器登记时声明的宿主类型名。
    pub expected: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_code_look_through_nesting() {
        let ty = TypeDescriptor::of("User");
        let inner = CodecError::from(DecodeError::UnexpectedShape {
            ty: ty.clone(),
            expected: "object",
            actual: "string",
        });
        let outer = CodecError::nested(
            &TypeDescriptor::of("Box"),
            &Arc::from("value"),
            CodecError::nested(&ty, &Arc::from("inner"), inner),
        );

        assert_eq!(outer.kind(), ErrorKind::Decode);
        assert_eq!(outer.code(), codes::DECODE_UNEXPECTED_SHAPE);
        assert_eq!(outer.path(), vec![Arc::<str>::from("value"), Arc::<str>::from("inner")]);
        assert!(outer.to_string().contains("`value` of `Box`"));
    }

    #[test]
    fn schema_error_names_type_and_members() {
        let err = SchemaError::MultipleDecodeConstructors {
            ty: TypeDescriptor::of("User"),
            constructors: vec![Arc::from("User(a)"), Arc::from("User(a, b)")],
        };
        let text = err.to_string();
        assert!(text.contains("`User`"));
        assert!(text.contains("2 given: User(a), User(a, b)"));
        assert_eq!(err.descriptor().name(), "User");
    }
}
