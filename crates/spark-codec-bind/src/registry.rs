//! 编解码注册中心：按具体类型描述符构建、缓存并提供编解码器。
//!
//! # 设计背景（Why）
//! - 每个具体类型只构建一次规格与编解码器，之后在所有线程间共享；
//! - 构建可能较慢（遍历元数据、校验、解析类型变量），不同类型之间不应互相阻塞，
//!   同一类型的并发首次请求也不应重复构建。
//!
//! # 逻辑解析（How）
//! - 查找顺序：显式登记的编解码器 → 用户工厂（登记顺序）→ 内建基础类型工厂 → 构造器引擎；
//! - 缓存为 `DashMap<TypeDescriptor, Arc<BuildSlot>>`：槽位内的 `OnceLock` 发布成品，
//!   `parking_lot::Mutex<()>` 作为该类型的构建闸门；
//! - 取出槽位的 `Arc` 后立即释放分片锁，构建期间不持有任何 `DashMap` guard。
//!
//! # 契约说明（What）
//! - 构建失败不缓存，空槽位随之移除，下一次请求会重新构建；
//! - 已发布的编解码器在注册中心生命周期内不会被替换或淘汰。
//!
//! # 风险提示（Trade-offs）
//! - 构建闸门不可重入：槽位记录正在构建的线程，同一线程在构建期间再次请求该类型
//!   （例如两个工厂互相同步解析）会得到 [`UsageError::RecursiveBuild`] 而不是死锁；
//!   嵌套类型仍应通过延迟槽位解析。

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::binding::ConstructorCodecFactory;
use crate::codec::{CodecFactory, TreeCodec, TypedCodecAdapter, TypedTreeCodec};
use crate::error::{CodecError, UsageError};
use crate::metadata::{MetadataCatalog, MetadataSource, TypeMetadata};
use crate::types::TypeDescriptor;

static GLOBAL: OnceLock<Arc<CodecRegistry>> = OnceLock::new();

#[derive(Default)]
struct BuildSlot {
    codec: OnceLock<Arc<dyn TreeCodec>>,
    gate: Mutex<()>,
    /// 持有构建闸门的线程。
    builder: Mutex<Option<ThreadId>>,
}

/// 构建结束（含失败与 panic）时清除槽位上的构建线程标记。
struct BuilderMark<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for BuilderMark<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// 编解码注册中心。
///
/// # 契约说明（What）
/// - `Send + Sync`，通常以 `Arc<CodecRegistry>` 在线程间共享；
/// - [`get_or_build`](Self::get_or_build) 对同一描述符总是返回同一个 `Arc`。
pub struct CodecRegistry {
    sources: Vec<Arc<dyn MetadataSource>>,
    explicit: HashMap<TypeDescriptor, Arc<dyn TreeCodec>>,
    factories: Vec<Arc<dyn CodecFactory>>,
    cache: DashMap<TypeDescriptor, Arc<BuildSlot>>,
}

impl CodecRegistry {
    /// 开始配置注册中心。
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::default()
    }

    /// 返回 `ty` 的编解码器，首次请求时构建。
    ///
    /// # 逻辑解析（How）
    /// 1. 显式登记的编解码器直接返回；
    /// 2. 无锁读取槽位中已发布的编解码器；
    /// 3. 当前线程正在构建该类型时立即报告 [`UsageError::RecursiveBuild`]；
    /// 4. 否则获取该类型的构建闸门，二次检查后依次询问各工厂；
    /// 5. 成功则发布到槽位，失败则移除空槽位并原样返回错误。
    pub fn get_or_build(&self, ty: &TypeDescriptor) -> Result<Arc<dyn TreeCodec>, CodecError> {
        if let Some(codec) = self.explicit.get(ty) {
            return Ok(codec.clone());
        }

        let slot = self.slot(ty);
        if let Some(codec) = slot.codec.get() {
            trace!(ty = %ty, "codec cache hit");
            return Ok(codec.clone());
        }

        let current = thread::current().id();
        if *slot.builder.lock() == Some(current) {
            let err = CodecError::from(UsageError::RecursiveBuild { ty: ty.clone() });
            warn!(ty = %ty, code = err.code(), "recursive codec build");
            return Err(err);
        }

        let _gate = slot.gate.lock();
        if let Some(codec) = slot.codec.get() {
            trace!(ty = %ty, "codec built by a concurrent caller");
            return Ok(codec.clone());
        }
        *slot.builder.lock() = Some(current);
        let _mark = BuilderMark(&slot.builder);

        debug!(ty = %ty, "building codec");
        match self.build(ty) {
            Ok((codec, source)) => {
                debug!(ty = %ty, source, "codec built");
                Ok(slot.codec.get_or_init(|| codec).clone())
            }
            Err(err) => {
                warn!(ty = %ty, code = err.code(), error = %err, "codec build failed");
                self.discard_unbuilt(ty, &slot);
                Err(err)
            }
        }
    }

    /// `ty` 的编解码器是否已经发布。
    pub fn is_built(&self, ty: &TypeDescriptor) -> bool {
        self.explicit.contains_key(ty)
            || self
                .cache
                .get(ty)
                .is_some_and(|slot| slot.codec.get().is_some())
    }

    /// 按原始类型名查询元数据，依次询问各元数据来源。
    pub fn metadata(&self, name: &str) -> Option<Arc<TypeMetadata>> {
        self.sources.iter().find_map(|source| source.lookup(name))
    }

    /// 解码并还原为 `T`。
    pub fn decode<T: Any>(&self, ty: &TypeDescriptor, input: &Value) -> Result<Option<T>, CodecError> {
        let codec = self.get_or_build(ty)?;
        match codec.decode(self, input)? {
            None => Ok(None),
            Some(instance) => instance.downcast::<T>().map(|boxed| Some(*boxed)).map_err(|_| {
                UsageError::TypeMismatch {
                    ty: ty.clone(),
                    expected: type_name::<T>(),
                }
                .into()
            }),
        }
    }

    /// 编码 `T`，`None` 编码为 [`Value::Null`]。
    pub fn encode<T: Any + Send + Sync>(
        &self,
        ty: &TypeDescriptor,
        value: Option<&T>,
    ) -> Result<Value, CodecError> {
        let codec = self.get_or_build(ty)?;
        codec.encode(self, value.map(|value| value as &(dyn Any + Send + Sync)))
    }

    /// 解析文本后解码。
    pub fn from_json_str<T: Any>(&self, ty: &TypeDescriptor, text: &str) -> Result<Option<T>, CodecError> {
        let tree: Value = serde_json::from_str(text)?;
        self.decode(ty, &tree)
    }

    /// 编码后序列化为文本。
    pub fn to_json_string<T: Any + Send + Sync>(
        &self,
        ty: &TypeDescriptor,
        value: Option<&T>,
    ) -> Result<String, CodecError> {
        let tree = self.encode(ty, value)?;
        Ok(serde_json::to_string(&tree)?)
    }

    /// 安装进程级注册中心，只能成功一次。
    pub fn install_global(registry: Arc<CodecRegistry>) -> Result<(), CodecError> {
        GLOBAL
            .set(registry)
            .map_err(|_| UsageError::GlobalAlreadyInstalled.into())
    }

    /// 进程级注册中心；未安装时返回 `None`。
    pub fn global() -> Option<&'static Arc<CodecRegistry>> {
        GLOBAL.get()
    }

    fn slot(&self, ty: &TypeDescriptor) -> Arc<BuildSlot> {
        if let Some(slot) = self.cache.get(ty) {
            return slot.value().clone();
        }
        self.cache.entry(ty.clone()).or_default().value().clone()
    }

    /// 移除构建失败留下的空槽位；仍有调用方在闸门上等待时保留，由它们继续构建。
    fn discard_unbuilt(&self, ty: &TypeDescriptor, slot: &Arc<BuildSlot>) {
        self.cache.remove_if(ty, |_, cached| {
            Arc::ptr_eq(cached, slot) && cached.codec.get().is_none() && Arc::strong_count(cached) == 2
        });
    }

    fn build(&self, ty: &TypeDescriptor) -> Result<(Arc<dyn TreeCodec>, &'static str), CodecError> {
        for factory in &self.factories {
            if let Some(codec) = factory.create(self, ty)? {
                return Ok((codec, factory.name()));
            }
        }
        Err(UsageError::Unsupported { ty: ty.clone() }.into())
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("sources", &self.sources.len())
            .field("explicit", &self.explicit.keys().collect::<Vec<_>>())
            .field(
                "factories",
                &self.factories.iter().map(|factory| factory.name()).collect::<Vec<_>>(),
            )
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// [`CodecRegistry`] 的构建器，集中承载全部配置。
///
/// # 契约说明（What）
/// - 通过 [`metadata`](Self::metadata) 登记的元数据优先于 [`metadata_source`](Self::metadata_source)；
/// - 显式编解码器对同一描述符后登记者覆盖先登记者；
/// - `well_known` 默认开启，仅在启用 `well-known` 特性时生效。
pub struct CodecRegistryBuilder {
    catalog: MetadataCatalog,
    sources: Vec<Arc<dyn MetadataSource>>,
    explicit: HashMap<TypeDescriptor, Arc<dyn TreeCodec>>,
    factories: Vec<Arc<dyn CodecFactory>>,
    well_known: bool,
}

impl Default for CodecRegistryBuilder {
    fn default() -> Self {
        Self {
            catalog: MetadataCatalog::new(),
            sources: Vec::new(),
            explicit: HashMap::new(),
            factories: Vec::new(),
            well_known: true,
        }
    }
}

impl CodecRegistryBuilder {
    /// 登记一个类型的元数据。
    pub fn metadata(mut self, metadata: TypeMetadata) -> Self {
        self.catalog.insert(metadata);
        self
    }

    /// 追加外部元数据来源，位于直接登记的元数据之后。
    pub fn metadata_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// 为具体类型登记现成的编解码器，优先于一切工厂。
    pub fn codec(mut self, ty: TypeDescriptor, codec: Arc<dyn TreeCodec>) -> Self {
        self.explicit.insert(ty, codec);
        self
    }

    /// 以强类型编解码器登记具体类型。
    pub fn typed_codec<C: TypedTreeCodec>(self, ty: TypeDescriptor, codec: C) -> Self {
        let adapter: Arc<dyn TreeCodec> = Arc::new(TypedCodecAdapter::new(ty.clone(), codec));
        self.codec(ty, adapter)
    }

    /// 追加用户工厂，位于内建来源之前。
    pub fn factory(mut self, factory: Arc<dyn CodecFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// 是否启用内建基础类型编解码器。
    pub fn well_known(mut self, enabled: bool) -> Self {
        self.well_known = enabled;
        self
    }

    /// 完成配置。
    pub fn build(self) -> CodecRegistry {
        let mut sources: Vec<Arc<dyn MetadataSource>> = Vec::with_capacity(self.sources.len() + 1);
        if !self.catalog.is_empty() {
            sources.push(Arc::new(self.catalog));
        }
        sources.extend(self.sources);

        let mut factories = self.factories;
        push_well_known(&mut factories, self.well_known);
        factories.push(Arc::new(ConstructorCodecFactory));

        CodecRegistry {
            sources,
            explicit: self.explicit,
            factories,
            cache: DashMap::new(),
        }
    }
}

#[cfg(feature = "well-known")]
fn push_well_known(factories: &mut Vec<Arc<dyn CodecFactory>>, enabled: bool) {
    if enabled {
        factories.push(Arc::new(crate::well_known::WellKnownFactory));
    }
}

#[cfg(not(feature = "well-known"))]
fn push_well_known(_: &mut Vec<Arc<dyn CodecFactory>>, _: bool) {}

impl fmt::Debug for CodecRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistryBuilder")
            .field("catalog", &self.catalog.len())
            .field("sources", &self.sources.len())
            .field("explicit", &self.explicit.len())
            .field("factories", &self.factories.len())
            .field("well_known", &self.well_known)
            .finish()
    }
}
