//! 编解码器契约：对象安全的 [`TreeCodec`]、强类型的 [`TypedTreeCodec`] 与二者之间的适配器。
//!
//! # 设计背景（Why）
//! - 注册中心需要把不同类型的编解码器存放在同一张表中，因此对外接口以 `Any` 擦除实例；
//! - 手写编解码器（基础类型、多态适配等）更适合静态泛型表达，[`TypedCodecAdapter`] 负责桥接，
//!   延续 `spark-core` 中 `Codec` → `DynCodec` 的做法。
//!
//! # 契约说明（What）
//! - 解码返回 `Ok(None)` 表示空值；编码收到 `None` 时应返回 [`Value::Null`]；
//! - 编解码器通过调用参数拿到注册中心，以便延迟解析嵌套类型，自身不持有注册中心。

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::{CodecError, DecodeError, UsageError};
use crate::metadata::Instance;
use crate::registry::CodecRegistry;
use crate::types::TypeDescriptor;

/// 对象安全的树编解码接口。
///
/// # 契约说明（What）
/// - **前置条件**：`registry` 必须是产生该编解码器的注册中心，嵌套类型从中解析；
/// - **后置条件**：实现需线程安全，同一实例会被并发调用。
pub trait TreeCodec: Send + Sync + 'static {
    /// 该编解码器服务的具体类型。
    fn descriptor(&self) -> &TypeDescriptor;

    /// 把树解码为擦除实例，空值返回 `Ok(None)`。
    fn decode(&self, registry: &CodecRegistry, input: &Value) -> Result<Option<Instance>, CodecError>;

    /// 把擦除实例编码为树，`None` 编码为 [`Value::Null`]。
    fn encode(
        &self,
        registry: &CodecRegistry,
        value: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Value, CodecError>;
}

/// 强类型编解码器收到的调用上下文。
#[derive(Clone, Copy)]
pub struct CodecContext<'a> {
    registry: &'a CodecRegistry,
    ty: &'a TypeDescriptor,
}

impl<'a> CodecContext<'a> {
    /// 组装上下文。
    pub fn new(registry: &'a CodecRegistry, ty: &'a TypeDescriptor) -> Self {
        Self { registry, ty }
    }

    /// 产生该编解码器的注册中心。
    pub fn registry(&self) -> &'a CodecRegistry {
        self.registry
    }

    /// 编解码器服务的具体类型。
    pub fn descriptor(&self) -> &'a TypeDescriptor {
        self.ty
    }

    /// 构造“输入形状不符”的解码错误。
    pub fn unexpected(&self, expected: &'static str, actual: &Value) -> CodecError {
        DecodeError::UnexpectedShape {
            ty: self.ty.clone(),
            expected,
            actual: value_kind(actual),
        }
        .into()
    }
}

impl fmt::Debug for CodecContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContext").field("ty", &self.ty).finish_non_exhaustive()
    }
}

/// 以具体类型表达的编解码器，通过 [`TypedCodecAdapter`] 注册。
pub trait TypedTreeCodec: Send + Sync + 'static {
    /// 编解码的 Rust 类型。
    type Item: Any + Send + Sync;

    /// 把树解码为 `Item`，空值返回 `Ok(None)`。
    fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<Self::Item>, CodecError>;

    /// 把 `Item` 编码为树，`None` 编码为 [`Value::Null`]。
    fn encode(&self, ctx: &CodecContext<'_>, item: Option<&Self::Item>) -> Result<Value, CodecError>;
}

/// 把 [`TypedTreeCodec`] 包装为对象安全的 [`TreeCodec`]。
///
/// # 逻辑解析（How）
/// - `decode` 把结果装箱为 [`Instance`]；
/// - `encode` 以 `downcast_ref` 还原 `C::Item`，失败时返回 [`UsageError::TypeMismatch`]。
///
/// # 风险提示（Trade-offs）
/// - 运行时下转型有微小开销；热点类型可直接实现 [`TreeCodec`]。
pub struct TypedCodecAdapter<C>
where
    C: TypedTreeCodec,
{
    descriptor: TypeDescriptor,
    inner: C,
}

impl<C> TypedCodecAdapter<C>
where
    C: TypedTreeCodec,
{
    /// 以 `descriptor` 登记 `inner`。
    pub fn new(descriptor: TypeDescriptor, inner: C) -> Self {
        Self { descriptor, inner }
    }

    /// 取回内部的强类型编解码器。
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> TreeCodec for TypedCodecAdapter<C>
where
    C: TypedTreeCodec,
{
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn decode(&self, registry: &CodecRegistry, input: &Value) -> Result<Option<Instance>, CodecError> {
        let ctx = CodecContext::new(registry, &self.descriptor);
        Ok(self
            .inner
            .decode(&ctx, input)?
            .map(|item| Box::new(item) as Instance))
    }

    fn encode(
        &self,
        registry: &CodecRegistry,
        value: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Value, CodecError> {
        let ctx = CodecContext::new(registry, &self.descriptor);
        match value {
            None => self.inner.encode(&ctx, None),
            Some(value) => match value.downcast_ref::<C::Item>() {
                Some(typed) => self.inner.encode(&ctx, Some(typed)),
                None => Err(UsageError::TypeMismatch {
                    ty: self.descriptor.clone(),
                    expected: type_name::<C::Item>(),
                }
                .into()),
            },
        }
    }
}

/// 按类型描述符按需创建编解码器的来源。
///
/// # 契约说明（What）
/// - 返回 `Ok(None)` 表示不处理该类型，注册中心继续询问下一个来源；
/// - 返回 `Err` 会终止本次构建，且不会被缓存；
/// - 构建闸门不可重入：`create` 中同步请求的类型若已在当前线程的构建链上（直接或经由其他工厂），
///   该请求返回 [`UsageError::RecursiveBuild`]；嵌套类型应使用延迟解析。
pub trait CodecFactory: Send + Sync + 'static {
    /// 为 `ty` 创建编解码器；不处理该类型时返回 `Ok(None)`。
    fn create(
        &self,
        registry: &CodecRegistry,
        ty: &TypeDescriptor,
    ) -> Result<Option<Arc<dyn TreeCodec>>, CodecError>;

    /// 日志中使用的来源名称。
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// 以闭包实现的 [`CodecFactory`]。
pub struct FnCodecFactory<F>
where
    F: Fn(&CodecRegistry, &TypeDescriptor) -> Result<Option<Arc<dyn TreeCodec>>, CodecError>
        + Send
        + Sync
        + 'static,
{
    name: &'static str,
    create: F,
}

impl<F> FnCodecFactory<F>
where
    F: Fn(&CodecRegistry, &TypeDescriptor) -> Result<Option<Arc<dyn TreeCodec>>, CodecError>
        + Send
        + Sync
        + 'static,
{
    /// 以日志名称与闭包构造工厂。
    pub fn new(name: &'static str, create: F) -> Self {
        Self { name, create }
    }
}

impl<F> CodecFactory for FnCodecFactory<F>
where
    F: Fn(&CodecRegistry, &TypeDescriptor) -> Result<Option<Arc<dyn TreeCodec>>, CodecError>
        + Send
        + Sync
        + 'static,
{
    fn create(
        &self,
        registry: &CodecRegistry,
        ty: &TypeDescriptor,
    ) -> Result<Option<Arc<dyn TreeCodec>>, CodecError> {
        (self.create)(registry, ty)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// 成员类型的延迟解析槽位。
///
/// 首次使用时才向注册中心请求编解码器，构建宿主类型因此不会递归构建成员类型，
/// 自引用类型也就不会在构建阶段成环。
pub(crate) struct NestedCodec {
    ty: TypeDescriptor,
    slot: OnceLock<Arc<dyn TreeCodec>>,
}

impl NestedCodec {
    pub(crate) fn new(ty: TypeDescriptor) -> Self {
        Self {
            ty,
            slot: OnceLock::new(),
        }
    }

    pub(crate) fn get(&self, registry: &CodecRegistry) -> Result<&Arc<dyn TreeCodec>, CodecError> {
        if let Some(codec) = self.slot.get() {
            return Ok(codec);
        }
        let codec = registry.get_or_build(&self.ty)?;
        Ok(self.slot.get_or_init(|| codec))
    }
}

impl fmt::Debug for NestedCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedCodec")
            .field("ty", &self.ty)
            .field("resolved", &self.slot.get().is_some())
            .finish()
    }
}

/// 树节点的种类名，用于错误信息。
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Celsius;

    impl TypedTreeCodec for Celsius {
        type Item = f64;

        fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<f64>, CodecError> {
            match input {
                Value::Null => Ok(None),
                Value::String(text) => text
                    .trim_end_matches("°C")
                    .parse()
                    .map(Some)
                    .map_err(|_| ctx.unexpected("a `<n>°C` string", input)),
                other => Err(ctx.unexpected("a `<n>°C` string", other)),
            }
        }

        fn encode(&self, _ctx: &CodecContext<'_>, item: Option<&f64>) -> Result<Value, CodecError> {
            Ok(item.map_or(Value::Null, |value| Value::from(format!("{value}°C"))))
        }
    }

    #[test]
    fn adapter_boxes_decoded_items_and_checks_encode_type() {
        let ty = TypeDescriptor::of("Celsius");
        let registry = CodecRegistry::builder().well_known(false).build();
        let adapter = TypedCodecAdapter::new(ty.clone(), Celsius);

        let decoded = adapter
            .decode(&registry, &Value::from("21.5°C"))
            .unwrap()
            .expect("非空输入");
        assert_eq!(decoded.downcast_ref::<f64>(), Some(&21.5));
        assert_eq!(adapter.encode(&registry, Some(&21.5_f64)).unwrap(), Value::from("21.5°C"));
        assert_eq!(adapter.encode(&registry, None).unwrap(), Value::Null);

        let err = adapter.encode(&registry, Some(&"hot")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = adapter.decode(&registry, &Value::Bool(true)).err().expect("形状不符");
        assert!(err.to_string().contains("boolean given"), "{err}");
    }

    #[test]
    fn value_kind_names_every_variant() {
        assert_eq!(value_kind(&Value::Null), "null");
        assert_eq!(value_kind(&serde_json::json!([1])), "array");
        assert_eq!(value_kind(&serde_json::json!({})), "object");
    }
}
