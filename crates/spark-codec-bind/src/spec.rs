//! 元数据提取：把 [`TypeMetadata`] 校验并整理为不可变的 [`Specification`]。
//!
//! # 设计背景（Why）
//! - 结构性错误（多个 `Read` 构造器、参数缺少绑定、重复的输出键……）应在类型首次使用时一次性暴露，
//!   而不是在某条报文解码到一半时才出现；
//! - 规格构建完成后，热路径只按下标遍历参数与访问器，不再解析标签或类型变量。
//!
//! # 逻辑解析（How）
//! 1. 解码半边：筛选带 `Read` 的构造器，至多一个；逐个参数确认恰有一个绑定标签；
//! 2. 编码半边：类级别带 `Write` 或任一访问器带编码标签时存在；收集带标签访问器，
//!    拒绝 `Void` 返回、冲突标签与重名键，再按“具名在前、合并在后”排序；
//! 3. 两个半边都缺失时返回 `Ok(None)`，交由注册中心尝试其他来源；
//! 4. 最后用 [`TypeResolver`] 把参数类型与返回类型解析为具体描述符。
//!
//! # 契约说明（What）
//! - 校验顺序固定，同一份错误元数据总是报告同一个错误；
//! - 未带编码标签的访问器被忽略，不参与任何校验。

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::metadata::{
    AccessFn, AccessorMeta, AccessorTag, ConstructFn, ConstructorMeta, ParamTag, ReturnType,
    TypeMetadata,
};
use crate::types::{TypeDescriptor, TypeExpr, TypeResolver};

/// 构造参数如何从输入对象取值。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamBinding {
    /// 取输入对象中该键的值，键缺失时视为空值。
    Named(Arc<str>),
    /// 取整个输入对象。
    WholeValue,
}

/// 单个构造参数的规格。
#[derive(Clone, Debug)]
pub struct ParamSpec {
    binding: ParamBinding,
    resolved: TypeDescriptor,
    label: Arc<str>,
}

impl ParamSpec {
    /// 取值方式。
    pub fn binding(&self) -> &ParamBinding {
        &self.binding
    }

    /// 解析后的参数类型，用于查找嵌套编解码器。
    pub fn resolved(&self) -> &TypeDescriptor {
        &self.resolved
    }

    /// 诊断用名称：具名参数为键名，整值参数为 `<root:N>`。
    pub fn label(&self) -> &Arc<str> {
        &self.label
    }
}

/// 解码半边：选定的构造器及其参数。
#[derive(Clone)]
pub struct ConstructorSpec {
    signature: Arc<str>,
    params: Vec<ParamSpec>,
    labels: Arc<[Arc<str>]>,
    construct: ConstructFn,
}

impl ConstructorSpec {
    /// 构造器签名。
    pub fn signature(&self) -> &Arc<str> {
        &self.signature
    }

    /// 按位置排列的参数。
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn labels(&self) -> &Arc<[Arc<str>]> {
        &self.labels
    }

    pub(crate) fn construct_fn(&self) -> &ConstructFn {
        &self.construct
    }
}

impl std::fmt::Debug for ConstructorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorSpec")
            .field("signature", &self.signature)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// 访问器结果如何写入输出对象。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessorBinding {
    /// 写在该键下。
    Named(Arc<str>),
    /// 结果对象的条目拼接进外层对象。
    Merge,
}

/// 单个编码访问器的规格。
#[derive(Clone)]
pub struct AccessorEntry {
    binding: AccessorBinding,
    accessor: Arc<str>,
    resolved: TypeDescriptor,
    access: AccessFn,
}

impl AccessorEntry {
    /// 输出方式。
    pub fn binding(&self) -> &AccessorBinding {
        &self.binding
    }

    /// 访问器名称。
    pub fn accessor(&self) -> &Arc<str> {
        &self.accessor
    }

    /// 解析后的返回类型。
    pub fn resolved(&self) -> &TypeDescriptor {
        &self.resolved
    }

    pub(crate) fn access_fn(&self) -> &AccessFn {
        &self.access
    }
}

impl std::fmt::Debug for AccessorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorEntry")
            .field("binding", &self.binding)
            .field("accessor", &self.accessor)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

/// 编码半边：具名访问器在前，合并访问器在后，各自保持声明顺序。
#[derive(Clone, Debug)]
pub struct AccessorSpec {
    entries: Vec<AccessorEntry>,
    named_count: usize,
    named_keys: HashMap<Arc<str>, usize>,
}

impl AccessorSpec {
    /// 全部条目：具名在前，合并在后。
    pub fn entries(&self) -> &[AccessorEntry] {
        &self.entries
    }

    /// 具名条目。
    pub fn named(&self) -> &[AccessorEntry] {
        &self.entries[..self.named_count]
    }

    /// 合并条目。
    pub fn merged(&self) -> &[AccessorEntry] {
        &self.entries[self.named_count..]
    }

    /// 占用 `key` 的具名访问器。
    pub fn named_owner(&self, key: &str) -> Option<&Arc<str>> {
        self.named_keys
            .get(key)
            .map(|&index| &self.entries[index].accessor)
    }
}

/// 一个具体类型的完整编解码规格，构建后只读。
#[derive(Clone, Debug)]
pub struct Specification {
    descriptor: TypeDescriptor,
    constructor: Option<ConstructorSpec>,
    accessors: Option<AccessorSpec>,
}

impl Specification {
    /// 规格对应的具体类型。
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// 解码半边；`None` 表示该类型只能编码。
    pub fn constructor(&self) -> Option<&ConstructorSpec> {
        self.constructor.as_ref()
    }

    /// 编码半边；`None` 表示该类型只能解码。
    pub fn accessors(&self) -> Option<&AccessorSpec> {
        self.accessors.as_ref()
    }
}

struct ParamDraft {
    binding: ParamBinding,
    declared: TypeExpr,
}

struct AccessorDraft<'m> {
    binding: AccessorBinding,
    meta: &'m AccessorMeta,
    returns: &'m TypeExpr,
}

/// 校验元数据并构建 `ty` 的规格。
///
/// # 契约说明（What）
/// - **返回值**：`Ok(None)` 表示类型既没有 `Read` 构造器也没有任何编码声明；
/// - **错误**：任一结构约束被违反时返回 [`SchemaError`]，错误携带 `ty` 与相关成员名；
/// - **后置条件**：返回的规格中所有类型变量均已替换为具体描述符。
pub fn extract(
    ty: &TypeDescriptor,
    meta: &TypeMetadata,
) -> Result<Option<Specification>, SchemaError> {
    let constructor = select_constructor(ty, meta.constructors())?;
    let params = match constructor {
        Some(constructor) => Some(bind_params(ty, constructor)?),
        None => None,
    };
    let accessors = bind_accessors(ty, meta)?;

    if params.is_none() && accessors.is_none() {
        return Ok(None);
    }

    let resolver = TypeResolver::new(ty, meta.type_params()).map_err(|mismatch| {
        SchemaError::TypeArity {
            ty: ty.clone(),
            expected: mismatch.expected,
            actual: mismatch.actual,
        }
    })?;
    let resolve = |member: &dyn Fn() -> String, declared: &TypeExpr| {
        resolver
            .resolve(declared)
            .map_err(|unbound| SchemaError::UnresolvedTypeVariable {
                ty: ty.clone(),
                member: member(),
                variable: unbound.variable,
            })
    };

    let constructor = match (constructor, params) {
        (Some(constructor), Some(drafts)) => {
            let mut params = Vec::with_capacity(drafts.len());
            for (index, draft) in drafts.into_iter().enumerate() {
                let resolved = resolve(
                    &|| format!("parameter #{index} of `{}`", constructor.signature()),
                    &draft.declared,
                )?;
                let label = match &draft.binding {
                    ParamBinding::Named(key) => key.clone(),
                    ParamBinding::WholeValue => Arc::from(format!("<root:{index}>")),
                };
                params.push(ParamSpec {
                    binding: draft.binding,
                    resolved,
                    label,
                });
            }
            let labels: Arc<[Arc<str>]> = params.iter().map(|param| param.label.clone()).collect();
            Some(ConstructorSpec {
                signature: constructor.signature().clone(),
                params,
                labels,
                construct: constructor.construct_fn().clone(),
            })
        }
        _ => None,
    };

    let accessors = match accessors {
        Some((drafts, named_count)) => {
            let mut entries = Vec::with_capacity(drafts.len());
            let mut named_keys = HashMap::with_capacity(named_count);
            for draft in drafts {
                let resolved = resolve(
                    &|| format!("accessor `{}`", draft.meta.name()),
                    draft.returns,
                )?;
                if let AccessorBinding::Named(key) = &draft.binding {
                    named_keys.insert(key.clone(), entries.len());
                }
                entries.push(AccessorEntry {
                    binding: draft.binding,
                    accessor: draft.meta.name().clone(),
                    resolved,
                    access: draft.meta.access_fn().clone(),
                });
            }
            Some(AccessorSpec {
                entries,
                named_count,
                named_keys,
            })
        }
        None => None,
    };

    Ok(Some(Specification {
        descriptor: ty.clone(),
        constructor,
        accessors,
    }))
}

fn select_constructor<'m>(
    ty: &TypeDescriptor,
    constructors: &'m [ConstructorMeta],
) -> Result<Option<&'m ConstructorMeta>, SchemaError> {
    let mut tagged = constructors.iter().filter(|constructor| constructor.is_read());
    let first = tagged.next();
    if tagged.next().is_some() {
        return Err(SchemaError::MultipleDecodeConstructors {
            ty: ty.clone(),
            constructors: constructors
                .iter()
                .filter(|constructor| constructor.is_read())
                .map(|constructor| constructor.signature().clone())
                .collect(),
        });
    }
    Ok(first)
}

fn bind_params(
    ty: &TypeDescriptor,
    constructor: &ConstructorMeta,
) -> Result<Vec<ParamDraft>, SchemaError> {
    constructor
        .params()
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let binding = match param.tags() {
                [] => {
                    return Err(SchemaError::UnboundParameter {
                        ty: ty.clone(),
                        constructor: constructor.signature().clone(),
                        index,
                    });
                }
                [ParamTag::ReadAs(key)] => ParamBinding::Named(key.clone()),
                [ParamTag::ReadAsRoot] => ParamBinding::WholeValue,
                tags => {
                    return Err(SchemaError::AmbiguousParameter {
                        ty: ty.clone(),
                        constructor: constructor.signature().clone(),
                        index,
                        tags: tags.iter().map(ToString::to_string).collect(),
                    });
                }
            };
            Ok(ParamDraft {
                binding,
                declared: param.declared().clone(),
            })
        })
        .collect()
}

fn bind_accessors<'m>(
    ty: &TypeDescriptor,
    meta: &'m TypeMetadata,
) -> Result<Option<(Vec<AccessorDraft<'m>>, usize)>, SchemaError> {
    let tagged: Vec<&AccessorMeta> = meta
        .accessors()
        .iter()
        .filter(|accessor| !accessor.tags().is_empty())
        .collect();
    if !meta.is_writable() && tagged.is_empty() {
        return Ok(None);
    }

    let void: Vec<Arc<str>> = tagged
        .iter()
        .filter(|accessor| matches!(accessor.returns(), ReturnType::Void))
        .map(|accessor| accessor.name().clone())
        .collect();
    if !void.is_empty() {
        return Err(SchemaError::VoidAccessor {
            ty: ty.clone(),
            accessors: void,
        });
    }

    let conflicting: Vec<Arc<str>> = tagged
        .iter()
        .filter(|accessor| accessor.tags().len() > 1)
        .map(|accessor| accessor.name().clone())
        .collect();
    if !conflicting.is_empty() {
        return Err(SchemaError::ConflictingAccessorBinding {
            ty: ty.clone(),
            accessors: conflicting,
        });
    }

    let mut named = Vec::new();
    let mut merged = Vec::new();
    let mut claimed: HashMap<&Arc<str>, &Arc<str>> = HashMap::new();
    for accessor in tagged {
        let ReturnType::Value(returns) = accessor.returns() else {
            continue;
        };
        match &accessor.tags()[0] {
            AccessorTag::WriteAs(key) => {
                if let Some(first) = claimed.insert(key, accessor.name()) {
                    return Err(SchemaError::DuplicateAccessorName {
                        ty: ty.clone(),
                        name: key.clone(),
                        first: first.clone(),
                        second: accessor.name().clone(),
                    });
                }
                named.push(AccessorDraft {
                    binding: AccessorBinding::Named(key.clone()),
                    meta: accessor,
                    returns,
                });
            }
            AccessorTag::MergeWithRoot => merged.push(AccessorDraft {
                binding: AccessorBinding::Merge,
                meta: accessor,
                returns,
            }),
        }
    }

    let named_count = named.len();
    named.extend(merged);
    Ok(Some((named, named_count)))
}
