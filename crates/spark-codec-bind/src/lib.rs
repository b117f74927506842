#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # spark-codec-bind
//!
//! ## 定位与职责（Why）
//! - 在内存值与通用树结构（`serde_json::Value`）之间提供双向编解码，
//!   绑定规则完全来自类型上登记的声明式元数据，而不是为每个类型手写编解码器；
//! - 解码时由唯一带 `Read` 标签的构造器接收参数，参数以 `ReadAs(name)` 绑定单个键，
//!   或以 `ReadAsRoot` 接收整个输入；
//! - 编码时调用带 `WriteAs(name)` 的访问器写入具名键，带 `MergeWithRoot` 的访问器结果拼接进外层对象，
//!   并检测键冲突。
//!
//! ## 架构嵌入（Where）
//! - [`types`]：具体类型描述符、带变量的类型表达式与解析器；
//! - [`metadata`]：构造器、参数、访问器及其标签的登记 API；
//! - [`spec`]：把元数据校验为不可变的编解码规格；
//! - [`codec`]：编解码器契约与强类型适配器；
//! - [`registry`]：按描述符构建、缓存并共享编解码器；
//! - [`binding`]：规格驱动的构造器引擎；
//! - [`well_known`]：字符串、布尔、数字、动态节点与列表等内建编解码器；
//! - [`error`]：分层错误与稳定错误码。
//!
//! ## 使用概览（How）
//! ```
//! use serde_json::json;
//! use spark_codec_bind::{
//!     AccessorMeta, Args, CodecRegistry, ConstructorMeta, ParamMeta, TypeDescriptor, TypeExpr,
//!     TypeMetadata,
//! };
//!
//! struct User {
//!     name: String,
//! }
//!
//! let registry = CodecRegistry::builder()
//!     .metadata(
//!         TypeMetadata::new("User")
//!             .constructor(
//!                 ConstructorMeta::new("User(name)", |args: &mut Args| {
//!                     Ok(User { name: args.take(0)? })
//!                 })
//!                 .read()
//!                 .param(ParamMeta::new(TypeExpr::of("String")).read_as("name")),
//!             )
//!             .accessor(
//!                 AccessorMeta::field("name", TypeExpr::of("String"), |user: &User| &user.name)
//!                     .write_as("name"),
//!             ),
//!     )
//!     .build();
//!
//! let ty = TypeDescriptor::of("User");
//! let user: User = registry.decode(&ty, &json!({"name": "Mike"}))?.expect("非空输入");
//! assert_eq!(user.name, "Mike");
//! assert_eq!(registry.encode(&ty, Some(&user))?, json!({"name": "Mike"}));
//! # Ok::<(), spark_codec_bind::CodecError>(())
//! ```
//!
//! ## Feature 策略（Trade-offs）
//! - `well-known`（默认开启）编译内建编解码器；关闭后所有基础类型都需显式登记。

/// 规格驱动的构造器引擎。
pub mod binding;
/// 编解码器契约与适配器。
pub mod codec;
mod decode;
mod encode;
/// 错误类型与稳定错误码。
pub mod error;
/// 声明式元数据登记 API。
pub mod metadata;
/// 编解码注册中心。
pub mod registry;
/// 元数据校验与规格构建。
pub mod spec;
/// 类型描述符与泛型解析。
pub mod types;
/// 内建基础类型编解码器。
#[cfg(feature = "well-known")]
pub mod well_known;

pub use crate::binding::{ConstructorCodec, ConstructorCodecFactory};
pub use crate::codec::{
    CodecContext, CodecFactory, FnCodecFactory, TreeCodec, TypedCodecAdapter, TypedTreeCodec,
    value_kind,
};
pub use crate::error::{
    ArgError, ArgErrorKind, BoxError, CodecError, Contender, DecodeError, EncodeError, ErrorKind,
    SchemaError, UsageError, codes,
};
pub use crate::metadata::{
    AccessFn, Accessed, AccessorMeta, AccessorTag, Args, ConstructFn, ConstructorMeta, Instance,
    MetadataCatalog, MetadataSource, ParamMeta, ParamTag, ReturnType, TypeMetadata,
};
pub use crate::registry::{CodecRegistry, CodecRegistryBuilder};
pub use crate::spec::{
    AccessorBinding, AccessorEntry, AccessorSpec, ConstructorSpec, ParamBinding, ParamSpec,
    Specification, extract,
};
pub use crate::types::{ParseTypeError, TypeDescriptor, TypeExpr, TypeResolver};
