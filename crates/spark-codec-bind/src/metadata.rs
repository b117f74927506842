//! 声明式元数据：构造器、参数、访问器及其标签。
//!
//! # 设计背景（Why）
//! - 引擎需要“枚举类型的构造器与访问器、读取其上的声明标签、按需调用”这一能力；
//!   Rust 没有运行时反射，因此由每个类型通过构建器显式登记一次，效果等同于反射出的成员表；
//! - 调用闭包在登记时捕获，规格构建后热路径上不再有任何按名查找。
//!
//! # 结构（How）
//! - [`TypeMetadata`]：一个原始类型（可带类型形参）的全部成员；
//! - [`ConstructorMeta`] / [`ParamMeta`]：构造器及参数，参数携带 [`ParamTag`]；
//! - [`AccessorMeta`]：无参取值方法，携带 [`AccessorTag`] 与声明返回类型 [`ReturnType`]；
//! - [`Args`] / [`Accessed`]：擦除后的参数包与访问结果；
//! - [`MetadataSource`]：按原始类型名查询元数据的接口，[`MetadataCatalog`] 为默认实现。
//!
//! # 契约说明（What）
//! - 标签只被记录，不在此处校验；所有结构性校验集中在 [`crate::spec::extract`]；
//! - 擦除实例统一为 [`Instance`]，空值以 `None` 表达，列表擦除为 `Vec<Option<Instance>>`。

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ArgError, ArgErrorKind, BoxError, InstanceMismatch};
use crate::types::TypeExpr;

/// 类型擦除后的实例。
pub type Instance = Box<dyn Any + Send + Sync>;

/// 以位置参数调用构造器。
pub type ConstructFn = Arc<dyn Fn(Args) -> Result<Instance, BoxError> + Send + Sync>;

/// 在宿主实例上调用访问器。
pub type AccessFn =
    Arc<dyn for<'a> Fn(&'a (dyn Any + Send + Sync)) -> Result<Accessed<'a>, BoxError> + Send + Sync>;

/// 构造参数上的绑定标签。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamTag {
    /// 读取输入对象中的单个键。
    ReadAs(Arc<str>),
    /// 把整个输入对象交给参数类型的编解码器。
    ReadAsRoot,
}

impl fmt::Display for ParamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamTag::ReadAs(name) => write!(f, "ReadAs(\"{name}\")"),
            ParamTag::ReadAsRoot => f.write_str("ReadAsRoot"),
        }
    }
}

/// 访问器上的编码标签。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessorTag {
    /// 结果写在输出对象的单个键下。
    WriteAs(Arc<str>),
    /// 结果必须编码为对象，其条目直接拼接进外层对象。
    MergeWithRoot,
}

/// 访问器声明的返回类型。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnType {
    /// 返回该类型的值。
    Value(TypeExpr),
    /// 不返回值。
    Void,
}

/// 构造参数：声明类型与绑定标签。
#[derive(Clone, Debug)]
pub struct ParamMeta {
    declared: TypeExpr,
    tags: Vec<ParamTag>,
}

impl ParamMeta {
    /// 以声明类型构造参数，尚无标签。
    pub fn new(declared: TypeExpr) -> Self {
        Self {
            declared,
            tags: Vec::new(),
        }
    }

    /// 追加 `ReadAs(name)` 标签。
    pub fn read_as(mut self, name: impl Into<Arc<str>>) -> Self {
        self.tags.push(ParamTag::ReadAs(name.into()));
        self
    }

    /// 追加 `ReadAsRoot` 标签。
    pub fn read_as_root(mut self) -> Self {
        self.tags.push(ParamTag::ReadAsRoot);
        self
    }

    /// 声明类型，可含类型变量。
    pub fn declared(&self) -> &TypeExpr {
        &self.declared
    }

    /// 登记顺序的绑定标签。
    pub fn tags(&self) -> &[ParamTag] {
        &self.tags
    }
}

/// 构造器：签名、是否带 `Read` 标签、参数表与调用闭包。
///
/// # 契约说明（What）
/// - `signature` 仅用于诊断信息，例如 `User(firstName, lastName)`；
/// - 调用闭包收到的 [`Args`] 与参数表逐位对应；闭包返回的错误会被解码器归因到类型与参数。
#[derive(Clone)]
pub struct ConstructorMeta {
    signature: Arc<str>,
    read: bool,
    params: Vec<ParamMeta>,
    construct: ConstructFn,
}

impl ConstructorMeta {
    /// 以强类型闭包登记构造器，返回值在内部装箱擦除。
    pub fn new<T, F>(signature: impl Into<Arc<str>>, construct: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut Args) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            signature: signature.into(),
            read: false,
            params: Vec::new(),
            construct: Arc::new(move |mut args: Args| {
                construct(&mut args).map(|value| Box::new(value) as Instance)
            }),
        }
    }

    /// 追加 `Read` 标签，指定该构造器用于解码。
    pub fn read(mut self) -> Self {
        self.read = true;
        self
    }

    /// 追加一个参数，顺序即位置。
    pub fn param(mut self, param: ParamMeta) -> Self {
        self.params.push(param);
        self
    }

    /// 诊断用签名。
    pub fn signature(&self) -> &Arc<str> {
        &self.signature
    }

    /// 是否带 `Read` 标签。
    pub fn is_read(&self) -> bool {
        self.read
    }

    /// 按位置排列的参数。
    pub fn params(&self) -> &[ParamMeta] {
        &self.params
    }

    pub(crate) fn construct_fn(&self) -> &ConstructFn {
        &self.construct
    }
}

impl fmt::Debug for ConstructorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorMeta")
            .field("signature", &self.signature)
            .field("read", &self.read)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// 访问器调用结果。
///
/// 字段通常以借用返回，计算属性以拥有所有权的 [`Instance`] 返回，空值为 `Null`。
pub enum Accessed<'a> {
    /// 空值。
    Null,
    /// 借用宿主实例内的值。
    Borrowed(&'a (dyn Any + Send + Sync)),
    /// 新产生的值。
    Owned(Instance),
}

impl Accessed<'_> {
    /// 供嵌套编解码器消费的擦除视图。
    pub fn as_any(&self) -> Option<&(dyn Any + Send + Sync)> {
        match self {
            Accessed::Null => None,
            Accessed::Borrowed(value) => Some(*value),
            Accessed::Owned(value) => Some(&**value),
        }
    }
}

impl fmt::Debug for Accessed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessed::Null => f.write_str("Null"),
            Accessed::Borrowed(_) => f.write_str("Borrowed(..)"),
            Accessed::Owned(_) => f.write_str("Owned(..)"),
        }
    }
}

fn access_fn<F>(f: F) -> AccessFn
where
    F: for<'a> Fn(&'a (dyn Any + Send + Sync)) -> Result<Accessed<'a>, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn owner_of<O: Any>(owner: &(dyn Any + Send + Sync)) -> Result<&O, BoxError> {
    owner.downcast_ref::<O>().ok_or_else(|| {
        Box::new(InstanceMismatch {
            expected: type_name::<O>(),
        }) as BoxError
    })
}

/// 无参取值方法。
///
/// # 使用方式（How）
/// - [`field`](Self::field)：返回字段借用；
/// - [`optional_field`](Self::optional_field)：返回可空字段借用；
/// - [`computed`](Self::computed)：返回新计算的值；
/// - [`list`](Self::list)：返回切片，按 `Vec<T>` 的擦除形态复制输出；
/// - [`erased`](Self::erased)：直接构造 [`Accessed`]，用于字段本身已是擦除实例的泛型容器；
/// - [`procedure`](Self::procedure)：声明返回 `Void` 的方法，仅用于登记，带编码标签会被拒绝。
#[derive(Clone)]
pub struct AccessorMeta {
    name: Arc<str>,
    returns: ReturnType,
    tags: Vec<AccessorTag>,
    access: AccessFn,
}

impl AccessorMeta {
    /// 返回字段借用的访问器。
    pub fn field<O, V, F>(name: impl Into<Arc<str>>, returns: TypeExpr, get: F) -> Self
    where
        O: Any + Send + Sync,
        V: Any + Send + Sync,
        F: for<'a> Fn(&'a O) -> &'a V + Send + Sync + 'static,
    {
        Self::erased::<O, _>(name, ReturnType::Value(returns), move |owner| {
            let value: &(dyn Any + Send + Sync) = get(owner);
            Accessed::Borrowed(value)
        })
    }

    /// 返回可空字段借用的访问器。
    pub fn optional_field<O, V, F>(name: impl Into<Arc<str>>, returns: TypeExpr, get: F) -> Self
    where
        O: Any + Send + Sync,
        V: Any + Send + Sync,
        F: for<'a> Fn(&'a O) -> Option<&'a V> + Send + Sync + 'static,
    {
        Self::erased::<O, _>(name, ReturnType::Value(returns), move |owner| match get(owner) {
            Some(value) => {
                let value: &(dyn Any + Send + Sync) = value;
                Accessed::Borrowed(value)
            }
            None => Accessed::Null,
        })
    }

    /// 返回新计算值的访问器。
    pub fn computed<O, V, F>(name: impl Into<Arc<str>>, returns: TypeExpr, get: F) -> Self
    where
        O: Any + Send + Sync,
        V: Any + Send + Sync,
        F: Fn(&O) -> V + Send + Sync + 'static,
    {
        Self::erased::<O, _>(name, ReturnType::Value(returns), move |owner| {
            Accessed::Owned(Box::new(get(owner)))
        })
    }

    /// 返回切片的访问器，元素逐个复制为擦除实例。
    pub fn list<O, V, F>(name: impl Into<Arc<str>>, returns: TypeExpr, get: F) -> Self
    where
        O: Any + Send + Sync,
        V: Any + Send + Sync + Clone,
        F: for<'a> Fn(&'a O) -> &'a [V] + Send + Sync + 'static,
    {
        Self::erased::<O, _>(name, ReturnType::Value(returns), move |owner| {
            let items: Vec<Option<Instance>> = get(owner)
                .iter()
                .map(|item| Some(Box::new(item.clone()) as Instance))
                .collect();
            Accessed::Owned(Box::new(items))
        })
    }

    /// 返回 `Void` 的方法。
    pub fn procedure<O, F>(name: impl Into<Arc<str>>, run: F) -> Self
    where
        O: Any + Send + Sync,
        F: Fn(&O) + Send + Sync + 'static,
    {
        Self::erased::<O, _>(name, ReturnType::Void, move |owner| {
            run(owner);
            Accessed::Null
        })
    }

    /// 直接产出 [`Accessed`] 的访问器。
    pub fn erased<O, F>(name: impl Into<Arc<str>>, returns: ReturnType, get: F) -> Self
    where
        O: Any + Send + Sync,
        F: for<'a> Fn(&'a O) -> Accessed<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            returns,
            tags: Vec::new(),
            access: access_fn(move |owner| Ok(get(owner_of::<O>(owner)?))),
        }
    }

    /// 追加 `WriteAs(name)` 标签。
    pub fn write_as(mut self, name: impl Into<Arc<str>>) -> Self {
        self.tags.push(AccessorTag::WriteAs(name.into()));
        self
    }

    /// 追加 `MergeWithRoot` 标签。
    pub fn merge_with_root(mut self) -> Self {
        self.tags.push(AccessorTag::MergeWithRoot);
        self
    }

    /// 访问器名称。
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// 声明的返回类型。
    pub fn returns(&self) -> &ReturnType {
        &self.returns
    }

    /// 登记顺序的编码标签。
    pub fn tags(&self) -> &[AccessorTag] {
        &self.tags
    }

    pub(crate) fn access_fn(&self) -> &AccessFn {
        &self.access
    }
}

impl fmt::Debug for AccessorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorMeta")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// 一个原始类型登记的全部成员。
///
/// # 契约说明（What）
/// - `name` 与 [`TypeDescriptor::name`](crate::types::TypeDescriptor::name) 匹配；
/// - `type_params` 按声明顺序与描述符实参一一对应，成员类型中的 [`TypeExpr::Var`] 引用这些名字；
/// - `writable` 对应类级别的 `Write` 标签。
#[derive(Clone, Debug)]
pub struct TypeMetadata {
    name: Arc<str>,
    type_params: Vec<Arc<str>>,
    writable: bool,
    constructors: Vec<ConstructorMeta>,
    accessors: Vec<AccessorMeta>,
}

impl TypeMetadata {
    /// 以原始类型名开始登记。
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            writable: false,
            constructors: Vec::new(),
            accessors: Vec::new(),
        }
    }

    /// 追加一个类型形参。
    pub fn type_param(mut self, name: impl Into<Arc<str>>) -> Self {
        self.type_params.push(name.into());
        self
    }

    /// 追加类级别 `Write` 标签。
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// 追加一个构造器。
    pub fn constructor(mut self, constructor: ConstructorMeta) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// 追加一个访问器。
    pub fn accessor(mut self, accessor: AccessorMeta) -> Self {
        self.accessors.push(accessor);
        self
    }

    /// 原始类型名。
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// 声明顺序的类型形参。
    pub fn type_params(&self) -> &[Arc<str>] {
        &self.type_params
    }

    /// 是否带类级别 `Write` 标签。
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// 全部构造器。
    pub fn constructors(&self) -> &[ConstructorMeta] {
        &self.constructors
    }

    /// 全部访问器，含未带标签者。
    pub fn accessors(&self) -> &[AccessorMeta] {
        &self.accessors
    }
}

/// 按原始类型名提供元数据。
pub trait MetadataSource: Send + Sync + 'static {
    /// 查询原始类型名为 `name` 的元数据。
    fn lookup(&self, name: &str) -> Option<Arc<TypeMetadata>>;
}

/// 基于 `HashMap` 的元数据目录，构建后只读。
#[derive(Debug, Default)]
pub struct MetadataCatalog {
    types: HashMap<Arc<str>, Arc<TypeMetadata>>,
}

impl MetadataCatalog {
    /// 空目录。
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记元数据；同名登记会覆盖旧值并返回它。
    pub fn insert(&mut self, metadata: TypeMetadata) -> Option<Arc<TypeMetadata>> {
        self.types
            .insert(metadata.name().clone(), Arc::new(metadata))
    }

    /// 已登记的类型数。
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// 目录是否为空。
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetadataSource for MetadataCatalog {
    fn lookup(&self, name: &str) -> Option<Arc<TypeMetadata>> {
        self.types.get(name).cloned()
    }
}

/// 交给构造器的位置参数包。
///
/// 每个位置只能取出一次；空值与已取出的位置都报告为 [`ArgErrorKind::Missing`]。
pub struct Args {
    values: Vec<Option<Instance>>,
    labels: Arc<[Arc<str>]>,
}

impl Args {
    pub(crate) fn new(values: Vec<Option<Instance>>, labels: Arc<[Arc<str>]>) -> Self {
        Self { values, labels }
    }

    /// 参数个数。
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否没有参数。
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 取出非空参数并还原为 `T`。
    pub fn take<T: Any>(&mut self, index: usize) -> Result<T, ArgError> {
        let value = self
            .take_instance(index)?
            .ok_or_else(|| self.error(index, ArgErrorKind::Missing))?;
        self.downcast(index, value)
    }

    /// 取出可空参数。
    pub fn take_opt<T: Any>(&mut self, index: usize) -> Result<Option<T>, ArgError> {
        match self.take_instance(index)? {
            Some(value) => self.downcast(index, value).map(Some),
            None => Ok(None),
        }
    }

    /// 取出 `Vec<T>` 参数，元素不允许为空。
    pub fn take_list<T: Any>(&mut self, index: usize) -> Result<Vec<T>, ArgError> {
        let items: Vec<Option<Instance>> = self.take(index)?;
        items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                let item =
                    item.ok_or_else(|| self.error(index, ArgErrorKind::NullElement { position }))?;
                self.downcast(index, item)
            })
            .collect()
    }

    /// 取出擦除形态的参数，用于字段本身保存擦除实例的泛型容器。
    pub fn take_instance(&mut self, index: usize) -> Result<Option<Instance>, ArgError> {
        match self.values.get_mut(index) {
            Some(slot) => Ok(slot.take()),
            None => Err(self.error(index, ArgErrorKind::OutOfRange)),
        }
    }

    fn downcast<T: Any>(&self, index: usize, value: Instance) -> Result<T, ArgError> {
        value.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            self.error(
                index,
                ArgErrorKind::TypeMismatch {
                    expected: type_name::<T>(),
                },
            )
        })
    }

    fn error(&self, index: usize, kind: ArgErrorKind) -> ArgError {
        ArgError {
            index,
            label: self
                .labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| Arc::from("?")),
            kind,
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("labels", &self.labels)
            .field(
                "present",
                &self.values.iter().map(Option::is_some).collect::<Vec<_>>(),
            )
            .finish()
    }
}
