//! 编码路径：调用编码访问器并组装输出对象。
//!
//! # 逻辑解析（How）
//! 1. 没有编码半边的类型报告 [`UsageError::ReadOnly`]；空值直接编码为 `null`，不调用任何访问器；
//! 2. 具名访问器按声明顺序写入各自的键；
//! 3. 合并访问器随后执行，结果必须是对象，其条目逐个拼接进输出对象；
//!    每个键先与具名键比对，再与本次调用中更早拼接的键比对，冲突即失败。
//!
//! # 契约说明（What）
//! - 输出对象的键顺序即写入顺序：具名键在前，合并键在后；
//! - 失败时不返回部分结果。
//!
//! # 风险提示（Trade-offs）
//! - 合并访问器返回空值同样视为“非对象”，调用方需要空合并时应返回空对象。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::trace;

use crate::binding::ConstructorCodec;
use crate::error::{BoxError, CodecError, Contender, EncodeError, InstanceMismatch, UsageError};
use crate::registry::CodecRegistry;
use crate::spec::{AccessorBinding, AccessorEntry};
use crate::types::TypeDescriptor;

impl ConstructorCodec {
    pub(crate) fn encode_tree(
        &self,
        registry: &CodecRegistry,
        value: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Value, CodecError> {
        let ty = self.spec.descriptor();
        let Some(accessors) = self.spec.accessors() else {
            return Err(UsageError::ReadOnly { ty: ty.clone() }.into());
        };
        let Some(owner) = value else {
            return Ok(Value::Null);
        };
        trace!(ty = %ty, accessors = accessors.entries().len(), "encoding");

        let mut output = Map::new();
        let mut spliced: HashMap<String, Arc<str>> = HashMap::new();
        for (entry, nested) in accessors.entries().iter().zip(&self.accessors) {
            let accessed = (entry.access_fn())(owner).map_err(|source| accessor_failure(ty, entry, source))?;
            let encoded = nested
                .get(registry)
                .and_then(|codec| codec.encode(registry, accessed.as_any()))
                .map_err(|err| CodecError::nested(ty, entry.accessor(), err))?;

            match entry.binding() {
                AccessorBinding::Named(key) => {
                    output.insert(key.to_string(), encoded);
                }
                AccessorBinding::Merge => {
                    let fields = match encoded {
                        Value::Object(fields) => fields,
                        other => {
                            return Err(EncodeError::MergeNotObject {
                                ty: ty.clone(),
                                accessor: entry.accessor().clone(),
                                value: other,
                            }
                            .into());
                        }
                    };
                    for (key, field) in fields {
                        let contender = match accessors.named_owner(&key) {
                            Some(named) => Some(Contender::Named {
                                accessor: named.clone(),
                            }),
                            None => spliced.get(&key).map(|merged| Contender::Merged {
                                accessor: merged.clone(),
                            }),
                        };
                        if let Some(contender) = contender {
                            return Err(EncodeError::MergeKeyCollision {
                                ty: ty.clone(),
                                key,
                                accessor: entry.accessor().clone(),
                                contender,
                            }
                            .into());
                        }
                        spliced.insert(key.clone(), entry.accessor().clone());
                        output.insert(key, field);
                    }
                }
            }
        }
        Ok(Value::Object(output))
    }
}

fn accessor_failure(ty: &TypeDescriptor, entry: &AccessorEntry, source: BoxError) -> CodecError {
    match source.downcast_ref::<InstanceMismatch>() {
        Some(mismatch) => UsageError::TypeMismatch {
            ty: ty.clone(),
            expected: mismatch.expected,
        }
        .into(),
        None => EncodeError::Accessor {
            ty: ty.clone(),
            accessor: entry.accessor().clone(),
            source,
        }
        .into(),
    }
}
