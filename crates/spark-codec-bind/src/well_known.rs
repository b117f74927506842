//! 内建基础类型编解码器。
//!
//! | 描述符 | Rust 类型 | 树节点 |
//! |---|---|---|
//! | `String` | `String` | 字符串 |
//! | `bool` | `bool` | 布尔 |
//! | `i64` | `i64` | 整数 |
//! | `f64` | `f64` | 数字 |
//! | `Value` | `serde_json::Value` | 任意节点，原样透传 |
//! | `Vec<T>` | `Vec<Option<Instance>>` | 数组，元素交给 `T` 的编解码器 |
//!
//! 所有编解码器对 `null` 输入返回空值，对空值输出 `null`。

use std::any::{Any, type_name};
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::codec::{
    CodecContext, CodecFactory, NestedCodec, TreeCodec, TypedCodecAdapter, TypedTreeCodec, value_kind,
};
use crate::error::{CodecError, DecodeError, EncodeError, UsageError};
use crate::metadata::Instance;
use crate::registry::CodecRegistry;
use crate::types::TypeDescriptor;

/// 按描述符名称分派内建编解码器的工厂。
#[derive(Clone, Copy, Debug, Default)]
pub struct WellKnownFactory;

impl CodecFactory for WellKnownFactory {
    fn create(
        &self,
        _registry: &CodecRegistry,
        ty: &TypeDescriptor,
    ) -> Result<Option<Arc<dyn TreeCodec>>, CodecError> {
        let codec: Arc<dyn TreeCodec> = match (ty.name(), ty.args()) {
            ("String", []) => Arc::new(TypedCodecAdapter::new(ty.clone(), StringCodec)),
            ("bool", []) => Arc::new(TypedCodecAdapter::new(ty.clone(), BoolCodec)),
            ("i64", []) => Arc::new(TypedCodecAdapter::new(ty.clone(), I64Codec)),
            ("f64", []) => Arc::new(TypedCodecAdapter::new(ty.clone(), F64Codec)),
            ("Value", []) => Arc::new(TypedCodecAdapter::new(ty.clone(), ValueCodec)),
            ("Vec", [element]) => Arc::new(ListCodec::new(ty.clone(), element.clone())),
            _ => return Ok(None),
        };
        Ok(Some(codec))
    }

    fn name(&self) -> &'static str {
        "well-known"
    }
}

/// `String` 与字符串节点。
#[derive(Clone, Copy, Debug, Default)]
pub struct StringCodec;

impl TypedTreeCodec for StringCodec {
    type Item = String;

    fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<String>, CodecError> {
        match input {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text.clone())),
            other => Err(ctx.unexpected("a string", other)),
        }
    }

    fn encode(&self, _ctx: &CodecContext<'_>, item: Option<&String>) -> Result<Value, CodecError> {
        Ok(item.map_or(Value::Null, |text| Value::String(text.clone())))
    }
}

/// `bool` 与布尔节点。
#[derive(Clone, Copy, Debug, Default)]
pub struct BoolCodec;

impl TypedTreeCodec for BoolCodec {
    type Item = bool;

    fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<bool>, CodecError> {
        match input {
            Value::Null => Ok(None),
            Value::Bool(flag) => Ok(Some(*flag)),
            other => Err(ctx.unexpected("a boolean", other)),
        }
    }

    fn encode(&self, _ctx: &CodecContext<'_>, item: Option<&bool>) -> Result<Value, CodecError> {
        Ok(item.map_or(Value::Null, |flag| Value::Bool(*flag)))
    }
}

/// `i64` 与整数节点。
#[derive(Clone, Copy, Debug, Default)]
pub struct I64Codec;

impl TypedTreeCodec for I64Codec {
    type Item = i64;

    fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<i64>, CodecError> {
        match input {
            Value::Null => Ok(None),
            Value::Number(number) => match number.as_i64() {
                Some(value) => Ok(Some(value)),
                None => Err(DecodeError::UnexpectedShape {
                    ty: ctx.descriptor().clone(),
                    expected: "an integer",
                    actual: if number.is_u64() {
                        "integer out of range"
                    } else {
                        "non-integral number"
                    },
                }
                .into()),
            },
            other => Err(ctx.unexpected("an integer", other)),
        }
    }

    fn encode(&self, _ctx: &CodecContext<'_>, item: Option<&i64>) -> Result<Value, CodecError> {
        Ok(item.map_or(Value::Null, |value| Value::from(*value)))
    }
}

/// `f64` 与数字节点。
#[derive(Clone, Copy, Debug, Default)]
pub struct F64Codec;

impl TypedTreeCodec for F64Codec {
    type Item = f64;

    fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<f64>, CodecError> {
        match input {
            Value::Null => Ok(None),
            Value::Number(number) => Ok(number.as_f64()),
            other => Err(ctx.unexpected("a number", other)),
        }
    }

    /// 非有限值（`NaN`、无穷）没有树表示，报告 [`EncodeError::NonFinite`]。
    fn encode(&self, ctx: &CodecContext<'_>, item: Option<&f64>) -> Result<Value, CodecError> {
        let Some(value) = item.copied() else {
            return Ok(Value::Null);
        };
        Number::from_f64(value).map(Value::Number).ok_or_else(|| {
            EncodeError::NonFinite {
                ty: ctx.descriptor().clone(),
                value,
            }
            .into()
        })
    }
}

/// 原样透传树节点，用于字段本身就是动态结构的场景。
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueCodec;

impl TypedTreeCodec for ValueCodec {
    type Item = Value;

    fn decode(&self, _ctx: &CodecContext<'_>, input: &Value) -> Result<Option<Value>, CodecError> {
        match input {
            Value::Null => Ok(None),
            other => Ok(Some(other.clone())),
        }
    }

    fn encode(&self, _ctx: &CodecContext<'_>, item: Option<&Value>) -> Result<Value, CodecError> {
        Ok(item.cloned().unwrap_or(Value::Null))
    }
}

/// `Vec<T>` 的编解码器，实例擦除为 `Vec<Option<Instance>>`。
///
/// 元素编解码器延迟解析，因此 `Vec<Node>` 可以出现在 `Node` 自身的成员中。
#[derive(Debug)]
pub struct ListCodec {
    descriptor: TypeDescriptor,
    element: NestedCodec,
}

impl ListCodec {
    /// 以元素类型构造列表编解码器。
    pub fn new(descriptor: TypeDescriptor, element: TypeDescriptor) -> Self {
        Self {
            descriptor,
            element: NestedCodec::new(element),
        }
    }

    fn position(index: usize) -> Arc<str> {
        Arc::from(format!("[{index}]"))
    }
}

impl TreeCodec for ListCodec {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn decode(&self, registry: &CodecRegistry, input: &Value) -> Result<Option<Instance>, CodecError> {
        let items = match input {
            Value::Null => return Ok(None),
            Value::Array(items) => items,
            other => {
                return Err(DecodeError::UnexpectedShape {
                    ty: self.descriptor.clone(),
                    expected: "an array",
                    actual: value_kind(other),
                }
                .into());
            }
        };
        let codec = self.element.get(registry)?;
        let decoded = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                codec
                    .decode(registry, item)
                    .map_err(|err| CodecError::nested(&self.descriptor, &Self::position(index), err))
            })
            .collect::<Result<Vec<Option<Instance>>, _>>()?;
        Ok(Some(Box::new(decoded)))
    }

    fn encode(
        &self,
        registry: &CodecRegistry,
        value: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Value, CodecError> {
        let Some(value) = value else {
            return Ok(Value::Null);
        };
        let items = value
            .downcast_ref::<Vec<Option<Instance>>>()
            .ok_or_else(|| UsageError::TypeMismatch {
                ty: self.descriptor.clone(),
                expected: type_name::<Vec<Option<Instance>>>(),
            })?;
        let codec = self.element.get(registry)?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                codec
                    .encode(registry, item.as_deref())
                    .map_err(|err| CodecError::nested(&self.descriptor, &Self::position(index), err))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}
