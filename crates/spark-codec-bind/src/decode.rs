//! 解码路径：把输入对象拆成构造参数并调用 `Read` 构造器。
//!
//! # 逻辑解析（How）
//! 1. 没有解码半边的类型直接报告 [`UsageError::WriteOnly`]；
//! 2. `null` 输入解码为空值，其他非对象输入报告 [`DecodeError::UnexpectedShape`]；
//! 3. 按参数顺序取值：具名参数取对应键（缺失视为 `null`，交给参数类型自行处理），
//!    整值参数取整个输入；再用参数类型的嵌套编解码器解码；
//! 4. 以位置参数调用构造器；构造器因取参失败而报错时，错误归因到对应参数。
//!
//! # 契约说明（What）
//! - 嵌套失败包裹为 [`CodecError::Nested`]，成员名为参数的键名或 `<root:N>`；
//! - 输入对象中未被任何参数引用的键被忽略。

use serde_json::Value;
use tracing::trace;

use crate::binding::ConstructorCodec;
use crate::codec::value_kind;
use crate::error::{ArgError, CodecError, DecodeError, UsageError};
use crate::metadata::{Args, Instance};
use crate::registry::CodecRegistry;
use crate::spec::ParamBinding;

static NULL: Value = Value::Null;

impl ConstructorCodec {
    pub(crate) fn decode_tree(
        &self,
        registry: &CodecRegistry,
        input: &Value,
    ) -> Result<Option<Instance>, CodecError> {
        let ty = self.spec.descriptor();
        let Some(constructor) = self.spec.constructor() else {
            return Err(UsageError::WriteOnly { ty: ty.clone() }.into());
        };

        let object = match input {
            Value::Null => return Ok(None),
            Value::Object(object) => object,
            other => {
                return Err(DecodeError::UnexpectedShape {
                    ty: ty.clone(),
                    expected: "object",
                    actual: value_kind(other),
                }
                .into());
            }
        };
        trace!(ty = %ty, keys = object.len(), "decoding");

        let mut values = Vec::with_capacity(constructor.params().len());
        for (param, nested) in constructor.params().iter().zip(&self.params) {
            let raw = match param.binding() {
                ParamBinding::Named(key) => object.get(&**key).unwrap_or(&NULL),
                ParamBinding::WholeValue => input,
            };
            let value = nested
                .get(registry)
                .and_then(|codec| codec.decode(registry, raw))
                .map_err(|err| CodecError::nested(ty, param.label(), err))?;
            values.push(value);
        }

        let args = Args::new(values, constructor.labels().clone());
        match (constructor.construct_fn())(args) {
            Ok(instance) => Ok(Some(instance)),
            Err(source) => {
                let parameter = source
                    .downcast_ref::<ArgError>()
                    .map(|err| err.label.clone());
                Err(DecodeError::Construction {
                    ty: ty.clone(),
                    constructor: constructor.signature().clone(),
                    parameter,
                    source,
                }
                .into())
            }
        }
    }
}
