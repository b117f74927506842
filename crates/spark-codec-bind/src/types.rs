//! 类型描述与泛型解析。
//!
//! # 角色定位（Why）
//! - 编解码器缓存以“具体类型实例化”为键，例如 `Box<User>` 与 `Box<Image>` 必须拥有各自的编解码器；
//! - 成员声明的类型可能携带类型变量（`Box<T>` 的构造参数声明为 `T`），需在构建规格时替换为具体类型。
//!
//! # 结构（How）
//! - [`TypeDescriptor`]：完全具体化的类型，`Arc` 共享、按结构比较与哈希；
//! - [`TypeExpr`]：成员声明侧的类型表达式，可为变量或带参数列表的具名类型；
//! - [`TypeResolver`]：将宿主类型的实参绑定到元数据声明的形参，并对表达式做纯结构替换。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// 具体类型的不透明句柄，含已解析的泛型实参。
///
/// # 契约说明（What）
/// - 两个描述符相等，当且仅当名称与全部实参逐一相等；
/// - 克隆只增加引用计数，可作为并发缓存的键频繁复制；
/// - `Display`/`FromStr` 使用 `Name<Arg, ...>` 语法，两者互逆。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    inner: Arc<DescriptorInner>,
}

#[derive(PartialEq, Eq, Hash)]
struct DescriptorInner {
    name: Arc<str>,
    args: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// 构造不带泛型实参的描述符，例如 `String`。
    pub fn of(name: impl Into<Arc<str>>) -> Self {
        Self::generic(name, Vec::new())
    }

    /// 构造带泛型实参的描述符，例如 `Box<User>`。
    pub fn generic(name: impl Into<Arc<str>>, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                name: name.into(),
                args: args.into_iter().collect(),
            }),
        }
    }

    /// 原始类型名（不含实参），元数据以此为索引。
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 按声明顺序排列的泛型实参。
    pub fn args(&self) -> &[TypeDescriptor] {
        &self.inner.args
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        write_args(f, self.args())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({self})")
    }
}

fn write_args<T: fmt::Display>(f: &mut fmt::Formatter<'_>, args: &[T]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    f.write_str("<")?;
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(">")
}

/// 解析 `Name<Arg, ...>` 文本失败。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid type descriptor `{input}` at byte {position}: {reason}")]
pub struct ParseTypeError {
    input: String,
    position: usize,
    reason: &'static str,
}

impl FromStr for TypeDescriptor {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = DescriptorParser { input: s, pos: 0 };
        let descriptor = parser.descriptor()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(descriptor)
    }
}

struct DescriptorParser<'a> {
    input: &'a str,
    pos: usize,
}

impl DescriptorParser<'_> {
    fn descriptor(&mut self) -> Result<TypeDescriptor, ParseTypeError> {
        self.skip_ws();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || matches!(ch, '_' | ':' | '.') {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected type name"));
        }
        let name = &self.input[start..self.pos];

        self.skip_ws();
        let mut args = Vec::new();
        if self.eat('<') {
            loop {
                args.push(self.descriptor()?);
                self.skip_ws();
                if self.eat(',') {
                    continue;
                }
                if self.eat('>') {
                    break;
                }
                return Err(self.error("expected `,` or `>`"));
            }
        }
        Ok(TypeDescriptor::generic(name, args))
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek().filter(|ch| ch.is_whitespace()) {
            self.pos += ch.len_utf8();
        }
    }

    fn error(&self, reason: &'static str) -> ParseTypeError {
        ParseTypeError {
            input: self.input.to_owned(),
            position: self.pos,
            reason,
        }
    }
}

/// 成员声明侧的类型表达式。
///
/// - `Var`：宿主类型的类型形参，例如 `Box<T>` 中的 `T`；
/// - `Named`：具名类型及其实参，实参本身也可以是表达式（`Vec<T>`）。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    /// 类型变量。
    Var(Arc<str>),
    /// 具名类型。
    Named {
        /// 原始类型名。
        name: Arc<str>,
        /// 实参表达式。
        args: Vec<TypeExpr>,
    },
}

impl TypeExpr {
    /// 类型变量。
    pub fn var(name: impl Into<Arc<str>>) -> Self {
        TypeExpr::Var(name.into())
    }

    /// 无实参的具名类型。
    pub fn of(name: impl Into<Arc<str>>) -> Self {
        Self::generic(name, Vec::new())
    }

    /// 带实参的具名类型。
    pub fn generic(name: impl Into<Arc<str>>, args: impl IntoIterator<Item = TypeExpr>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    /// 表达式中是否不含任何类型变量。
    pub fn is_concrete(&self) -> bool {
        match self {
            TypeExpr::Var(_) => false,
            TypeExpr::Named { args, .. } => args.iter().all(TypeExpr::is_concrete),
        }
    }
}

impl From<TypeDescriptor> for TypeExpr {
    fn from(value: TypeDescriptor) -> Self {
        TypeExpr::Named {
            name: value.inner.name.clone(),
            args: value.args().iter().cloned().map(TypeExpr::from).collect(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Var(name) => f.write_str(name),
            TypeExpr::Named { name, args } => {
                f.write_str(name)?;
                write_args(f, args)
            }
        }
    }
}

/// 表达式中出现了宿主类型未声明的类型变量。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("type variable `{variable}` is not bound by the owner type")]
pub struct UnboundVariable {
    /// 未绑定的变量名。
    pub variable: Arc<str>,
}

/// 宿主类型实参个数与元数据声明的形参个数不一致。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("expected {expected} type argument(s), found {actual}")]
pub struct ArityMismatch {
    /// 元数据声明的形参个数。
    pub expected: usize,
    /// 描述符携带的实参个数。
    pub actual: usize,
}

/// 以宿主类型为上下文，把成员声明的类型表达式替换为具体类型。
///
/// # 契约说明（What）
/// - **前置条件**：`params` 为元数据声明的类型形参（按声明顺序），数量必须与 `owner.args()` 一致；
/// - **后置条件**：`resolve` 只做结构替换，不读取任何运行时值；不含变量的表达式原样转换为描述符。
#[derive(Debug)]
pub struct TypeResolver<'a> {
    params: &'a [Arc<str>],
    args: &'a [TypeDescriptor],
}

impl<'a> TypeResolver<'a> {
    /// 绑定宿主类型的实参。
    pub fn new(owner: &'a TypeDescriptor, params: &'a [Arc<str>]) -> Result<Self, ArityMismatch> {
        if owner.args().len() != params.len() {
            return Err(ArityMismatch {
                expected: params.len(),
                actual: owner.args().len(),
            });
        }
        Ok(Self {
            params,
            args: owner.args(),
        })
    }

    /// 递归替换表达式中的类型变量。
    pub fn resolve(&self, declared: &TypeExpr) -> Result<TypeDescriptor, UnboundVariable> {
        match declared {
            TypeExpr::Var(variable) => self
                .params
                .iter()
                .position(|param| param == variable)
                .map(|index| self.args[index].clone())
                .ok_or_else(|| UnboundVariable {
                    variable: variable.clone(),
                }),
            TypeExpr::Named { name, args } => {
                let resolved = args
                    .iter()
                    .map(|arg| self.resolve(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TypeDescriptor::generic(name.clone(), resolved))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(names: &[&str]) -> Vec<Arc<str>> {
        names.iter().map(|name| Arc::from(*name)).collect()
    }

    #[test]
    fn descriptor_display_and_parse_agree() {
        let parsed: TypeDescriptor = " Page< Vec<User> , i64 >".parse().expect("合法描述符");
        assert_eq!(parsed.to_string(), "Page<Vec<User>, i64>");
        assert_eq!(parsed.name(), "Page");
        assert_eq!(parsed.args()[0], "Vec<User>".parse().unwrap());
        assert_eq!(parsed, parsed.to_string().parse().unwrap());
    }

    #[test]
    fn descriptor_parse_rejects_malformed_input() {
        assert!("Box<User".parse::<TypeDescriptor>().is_err());
        assert!("<User>".parse::<TypeDescriptor>().is_err());
        assert!("Box<User> extra".parse::<TypeDescriptor>().is_err());
    }

    #[test]
    fn descriptors_are_equal_by_structure() {
        let a = TypeDescriptor::generic("Box", [TypeDescriptor::of("User")]);
        let b: TypeDescriptor = "Box<User>".parse().unwrap();
        let c: TypeDescriptor = "Box<Image>".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn resolver_substitutes_nested_variables() {
        let owner: TypeDescriptor = "Box<User>".parse().unwrap();
        let declared = params(&["T"]);
        let resolver = TypeResolver::new(&owner, &declared).unwrap();

        let list = TypeExpr::generic("Vec", [TypeExpr::var("T")]);
        assert_eq!(resolver.resolve(&list).unwrap().to_string(), "Vec<User>");
        assert_eq!(resolver.resolve(&TypeExpr::var("T")).unwrap().to_string(), "User");
    }

    #[test]
    fn resolver_leaves_concrete_expressions_unchanged() {
        let owner = TypeDescriptor::of("User");
        let resolver = TypeResolver::new(&owner, &[]).unwrap();
        let concrete = TypeExpr::generic("Vec", [TypeExpr::of("String")]);
        assert!(concrete.is_concrete());
        assert_eq!(
            TypeExpr::from(resolver.resolve(&concrete).unwrap()),
            concrete
        );
    }

    #[test]
    fn resolver_reports_unbound_variable_and_arity() {
        let owner: TypeDescriptor = "Box<User>".parse().unwrap();
        let declared = params(&["T"]);
        let resolver = TypeResolver::new(&owner, &declared).unwrap();
        let err = resolver.resolve(&TypeExpr::var("U")).unwrap_err();
        assert_eq!(&*err.variable, "U");

        let arity = TypeResolver::new(&owner, &[]).unwrap_err();
        assert_eq!(arity, ArityMismatch { expected: 0, actual: 1 });
    }
}
