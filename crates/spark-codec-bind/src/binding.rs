//! 构造器引擎：以 [`Specification`] 驱动的编解码器及其工厂。
//!
//! 解码路径见 `decode` 模块，编码路径见 `encode` 模块；本模块只负责组装。

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::codec::{CodecFactory, NestedCodec, TreeCodec};
use crate::error::CodecError;
use crate::metadata::Instance;
use crate::registry::CodecRegistry;
use crate::spec::{self, Specification};
use crate::types::TypeDescriptor;

/// 从元数据构建 [`ConstructorCodec`] 的工厂，位于注册中心查找链的末尾。
///
/// # 契约说明（What）
/// - 没有元数据、或元数据既无 `Read` 构造器也无编码声明时返回 `Ok(None)`；
/// - 元数据违反结构约束时返回 [`SchemaError`](crate::error::SchemaError)。
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstructorCodecFactory;

impl CodecFactory for ConstructorCodecFactory {
    fn create(
        &self,
        registry: &CodecRegistry,
        ty: &TypeDescriptor,
    ) -> Result<Option<Arc<dyn TreeCodec>>, CodecError> {
        let Some(metadata) = registry.metadata(ty.name()) else {
            return Ok(None);
        };
        Ok(spec::extract(ty, &metadata)?
            .map(|spec| Arc::new(ConstructorCodec::new(spec)) as Arc<dyn TreeCodec>))
    }

    fn name(&self) -> &'static str {
        "constructor"
    }
}

/// 由规格驱动的编解码器。
///
/// 每个构造参数、每个编码访问器各持有一个延迟解析的嵌套编解码器槽位，
/// 下标与规格中的顺序一一对应。
#[derive(Debug)]
pub struct ConstructorCodec {
    pub(crate) spec: Arc<Specification>,
    pub(crate) params: Vec<NestedCodec>,
    pub(crate) accessors: Vec<NestedCodec>,
}

impl ConstructorCodec {
    /// 由规格构建编解码器，成员槽位此时均未解析。
    pub fn new(spec: Specification) -> Self {
        let params = spec
            .constructor()
            .map(|constructor| {
                constructor
                    .params()
                    .iter()
                    .map(|param| NestedCodec::new(param.resolved().clone()))
                    .collect()
            })
            .unwrap_or_default();
        let accessors = spec
            .accessors()
            .map(|accessors| {
                accessors
                    .entries()
                    .iter()
                    .map(|entry| NestedCodec::new(entry.resolved().clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            spec: Arc::new(spec),
            params,
            accessors,
        }
    }

    /// 驱动该编解码器的规格。
    pub fn specification(&self) -> &Specification {
        &self.spec
    }
}

impl TreeCodec for ConstructorCodec {
    fn descriptor(&self) -> &TypeDescriptor {
        self.spec.descriptor()
    }

    fn decode(&self, registry: &CodecRegistry, input: &Value) -> Result<Option<Instance>, CodecError> {
        self.decode_tree(registry, input)
    }

    fn encode(
        &self,
        registry: &CodecRegistry,
        value: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Value, CodecError> {
        self.encode_tree(registry, value)
    }
}
