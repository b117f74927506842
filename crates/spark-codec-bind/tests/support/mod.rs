//! 集成测试共用的模型与元数据登记。
//!
//! - `User` / `Image`：具名键的往返；`Image` 的字段可空；
//! - `Account` + `Role`：整值参数交给手写编解码器；
//! - `Envelope` / `Clash` / `Twin` / `Scalar`：合并访问器的拼接与冲突；
//! - `GenericBox` / `Page` / `Node`：泛型与自引用类型。

#![allow(dead_code)]

use serde_json::Value;
use spark_codec_bind::{
    Accessed, AccessorMeta, Args, CodecContext, CodecError, CodecRegistry, CodecRegistryBuilder,
    ConstructorMeta, Instance, ParamMeta, ReturnType, TypeDescriptor, TypeExpr, TypeMetadata,
    TypedTreeCodec,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub surname: String,
}

impl User {
    pub fn new(name: &str, surname: &str) -> Self {
        Self {
            name: name.to_owned(),
            surname: surname.to_owned(),
        }
    }
}

pub fn user_metadata() -> TypeMetadata {
    TypeMetadata::new("User")
        .writable()
        .constructor(
            ConstructorMeta::new("User(name, surname)", |args: &mut Args| {
                Ok(User {
                    name: args.take(0)?,
                    surname: args.take(1)?,
                })
            })
            .read()
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("firstName"))
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("lastName")),
        )
        .accessor(
            AccessorMeta::field("name", TypeExpr::of("String"), |user: &User| &user.name)
                .write_as("firstName"),
        )
        .accessor(
            AccessorMeta::field("surname", TypeExpr::of("String"), |user: &User| &user.surname)
                .write_as("lastName"),
        )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub medium: Option<String>,
    pub large: Option<String>,
}

pub fn image_metadata() -> TypeMetadata {
    TypeMetadata::new("Image")
        .writable()
        .constructor(
            ConstructorMeta::new("Image(medium, large)", |args: &mut Args| {
                Ok(Image {
                    medium: args.take_opt(0)?,
                    large: args.take_opt(1)?,
                })
            })
            .read()
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("url_640"))
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("url_2048")),
        )
        .accessor(
            AccessorMeta::optional_field("medium", TypeExpr::of("String"), |image: &Image| {
                image.medium.as_ref()
            })
            .write_as("url_640"),
        )
        .accessor(
            AccessorMeta::optional_field("large", TypeExpr::of("String"), |image: &Image| {
                image.large.as_ref()
            })
            .write_as("url_2048"),
        )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Normal,
    Admin,
}

/// 从整个账户对象的 `admin` 标志推导角色。
pub struct RoleCodec;

impl TypedTreeCodec for RoleCodec {
    type Item = Role;

    fn decode(&self, ctx: &CodecContext<'_>, input: &Value) -> Result<Option<Role>, CodecError> {
        match input.get("admin") {
            Some(Value::Bool(true)) => Ok(Some(Role::Admin)),
            Some(Value::Bool(false)) | None => Ok(Some(Role::Normal)),
            Some(other) => Err(ctx.unexpected("a boolean `admin` flag", other)),
        }
    }

    fn encode(&self, _ctx: &CodecContext<'_>, item: Option<&Role>) -> Result<Value, CodecError> {
        Ok(match item {
            Some(Role::Admin) => serde_json::json!({ "admin": true }),
            Some(Role::Normal) => serde_json::json!({ "admin": false }),
            None => Value::Null,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub role: Role,
}

pub fn account_metadata() -> TypeMetadata {
    TypeMetadata::new("Account")
        .constructor(
            ConstructorMeta::new("Account(id, role)", |args: &mut Args| {
                Ok(Account {
                    id: args.take(0)?,
                    role: args.take(1)?,
                })
            })
            .read()
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("id"))
            .param(ParamMeta::new(TypeExpr::of("Role")).read_as_root()),
        )
        .accessor(AccessorMeta::field("id", TypeExpr::of("String"), |account: &Account| &account.id).write_as("id"))
        .accessor(
            AccessorMeta::field("role", TypeExpr::of("Role"), |account: &Account| &account.role)
                .merge_with_root(),
        )
}

/// 具名 `id` 加上拼接进来的 `User` 字段。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    pub user: User,
}

pub fn envelope_metadata() -> TypeMetadata {
    TypeMetadata::new("Envelope")
        .accessor(
            AccessorMeta::field("user", TypeExpr::of("User"), |envelope: &Envelope| &envelope.user)
                .merge_with_root(),
        )
        .accessor(AccessorMeta::field("id", TypeExpr::of("String"), |envelope: &Envelope| &envelope.id).write_as("id"))
}

/// 具名键 `firstName` 与合并进来的 `User` 冲突。
pub struct Clash {
    pub nickname: String,
    pub user: User,
}

pub fn clash_metadata() -> TypeMetadata {
    TypeMetadata::new("Clash")
        .accessor(
            AccessorMeta::field("nickname", TypeExpr::of("String"), |clash: &Clash| &clash.nickname)
                .write_as("firstName"),
        )
        .accessor(AccessorMeta::field("user", TypeExpr::of("User"), |clash: &Clash| &clash.user).merge_with_root())
}

/// 两个合并访问器产出相同的键。
pub struct Twin {
    pub left: User,
    pub right: User,
}

pub fn twin_metadata() -> TypeMetadata {
    TypeMetadata::new("Twin")
        .accessor(AccessorMeta::field("left", TypeExpr::of("User"), |twin: &Twin| &twin.left).merge_with_root())
        .accessor(AccessorMeta::field("right", TypeExpr::of("User"), |twin: &Twin| &twin.right).merge_with_root())
}

/// 合并访问器产出字符串而不是对象。
pub struct Scalar {
    pub id: String,
}

pub fn scalar_metadata() -> TypeMetadata {
    TypeMetadata::new("Scalar")
        .accessor(AccessorMeta::field("id", TypeExpr::of("String"), |scalar: &Scalar| &scalar.id).merge_with_root())
}

/// `Box<T>`：字段以擦除形态保存。
#[derive(Debug)]
pub struct GenericBox {
    pub value: Option<Instance>,
}

pub fn box_metadata() -> TypeMetadata {
    TypeMetadata::new("Box")
        .type_param("T")
        .writable()
        .constructor(
            ConstructorMeta::new("Box(value)", |args: &mut Args| {
                Ok(GenericBox {
                    value: args.take_instance(0)?,
                })
            })
            .read()
            .param(ParamMeta::new(TypeExpr::var("T")).read_as("value")),
        )
        .accessor(
            AccessorMeta::erased::<GenericBox, _>(
                "value",
                ReturnType::Value(TypeExpr::var("T")),
                |boxed| match &boxed.value {
                    Some(value) => Accessed::Borrowed(&**value),
                    None => Accessed::Null,
                },
            )
            .write_as("value"),
        )
}

/// `Page<T>`：列表成员的类型依赖宿主实参。
#[derive(Debug)]
pub struct Page {
    pub items: Vec<Option<Instance>>,
    pub total: i64,
}

pub fn page_metadata() -> TypeMetadata {
    let items = || TypeExpr::generic("Vec", [TypeExpr::var("T")]);
    TypeMetadata::new("Page")
        .type_param("T")
        .constructor(
            ConstructorMeta::new("Page(items, total)", |args: &mut Args| {
                Ok(Page {
                    items: args.take(0)?,
                    total: args.take(1)?,
                })
            })
            .read()
            .param(ParamMeta::new(items()).read_as("items"))
            .param(ParamMeta::new(TypeExpr::of("i64")).read_as("total")),
        )
        .accessor(
            AccessorMeta::erased::<Page, _>("items", ReturnType::Value(items()), |page| {
                Accessed::Borrowed(&page.items)
            })
            .write_as("items"),
        )
        .accessor(AccessorMeta::field("total", TypeExpr::of("i64"), |page: &Page| &page.total).write_as("total"))
}

/// 自引用树节点。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub label: String,
    pub children: Vec<Node>,
}

pub fn node_metadata() -> TypeMetadata {
    let children = || TypeExpr::generic("Vec", [TypeExpr::of("Node")]);
    TypeMetadata::new("Node")
        .constructor(
            ConstructorMeta::new("Node(label, children)", |args: &mut Args| {
                Ok(Node {
                    label: args.take(0)?,
                    children: args.take_list(1)?,
                })
            })
            .read()
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("label"))
            .param(ParamMeta::new(children()).read_as("children")),
        )
        .accessor(AccessorMeta::field("label", TypeExpr::of("String"), |node: &Node| &node.label).write_as("label"))
        .accessor(
            AccessorMeta::list("children", children(), |node: &Node| node.children.as_slice())
                .write_as("children"),
        )
}

/// 登记了全部测试模型的构建器。
pub fn builder() -> CodecRegistryBuilder {
    CodecRegistry::builder()
        .metadata(user_metadata())
        .metadata(image_metadata())
        .metadata(account_metadata())
        .metadata(envelope_metadata())
        .metadata(clash_metadata())
        .metadata(twin_metadata())
        .metadata(scalar_metadata())
        .metadata(box_metadata())
        .metadata(page_metadata())
        .metadata(node_metadata())
        .typed_codec(TypeDescriptor::of("Role"), RoleCodec)
}

pub fn registry() -> CodecRegistry {
    builder().build()
}

pub fn ty(text: &str) -> TypeDescriptor {
    text.parse().expect("测试中的类型描述符应合法")
}
