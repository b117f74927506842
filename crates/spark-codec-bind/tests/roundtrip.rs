//! 具名绑定与整值绑定的往返测试。
//!
//! ## 设计意图（Why）
//! - 锁定最常见的用法：构造器参数以 `ReadAs` 读取键，访问器以 `WriteAs` 写回同名键；
//! - 覆盖可空字段、整值参数、空值短路与文本入口，确保行为与文档一致。
//!
//! ## 预置条件（What）
//! - 模型定义见 `support` 模块，默认启用 `well-known` 特性。

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use spark_codec_bind::{
    AccessorMeta, Args, CodecError, CodecRegistry, ConstructorMeta, DecodeError, ErrorKind,
    ParamMeta, TypeExpr, TypeMetadata, UsageError, codes,
};
use support::{Account, Image, Role, User, registry, ty};

/// 具名访问器按声明顺序写出键。
#[test]
fn user_encodes_named_keys_in_declaration_order() {
    let registry = registry();
    let text = registry
        .to_json_string(&ty("User"), Some(&User::new("Mike", "Gorunov")))
        .expect("User 可编码");
    assert_eq!(text, r#"{"firstName":"Mike","lastName":"Gorunov"}"#);
}

/// 具名参数按键取值，与输入中键的顺序无关，多余的键被忽略。
#[test]
fn user_decodes_from_any_key_order() {
    let registry = registry();
    let user: User = registry
        .from_json_str(
            &ty("User"),
            r#"{ "lastName": "G", "nickname": "ignored", "firstName": "Mike" }"#,
        )
        .expect("User 可解码")
        .expect("输入非空");
    assert_eq!(user, User::new("Mike", "G"));
}

/// 可空字段经过一次编码再解码后保持不变。
#[test]
fn image_survives_back_and_forth() {
    let registry = registry();
    let image = Image {
        medium: Some("640x640".to_owned()),
        large: Some("2048x2048".to_owned()),
    };
    let tree = registry.encode(&ty("Image"), Some(&image)).expect("Image 可编码");
    assert_eq!(tree, json!({ "url_640": "640x640", "url_2048": "2048x2048" }));

    let parsed: Image = registry.decode(&ty("Image"), &tree).unwrap().expect("输入非空");
    assert_eq!(parsed, image);
}

/// 缺失的键以空值交给参数类型；空字段编码为 `null`。
#[test]
fn absent_keys_reach_nullable_parameters_as_null() {
    let registry = registry();
    let parsed: Image = registry
        .decode(&ty("Image"), &json!({ "url_640": "640x640" }))
        .unwrap()
        .expect("输入非空");
    assert_eq!(parsed.large, None);

    let tree = registry.encode(&ty("Image"), Some(&parsed)).unwrap();
    assert_eq!(tree, json!({ "url_640": "640x640", "url_2048": null }));
}

/// 非空参数缺失时，构造失败被归因到对应的键。
#[test]
fn missing_required_key_is_attributed_to_its_parameter() {
    let registry = registry();
    let err = registry
        .decode::<User>(&ty("User"), &json!({ "firstName": "Mike" }))
        .unwrap_err();
    assert_eq!(err.code(), codes::DECODE_CONSTRUCTION);
    match err {
        CodecError::Decode(DecodeError::Construction {
            constructor,
            parameter,
            ..
        }) => {
            assert_eq!(&*constructor, "User(name, surname)");
            assert_eq!(parameter.as_deref(), Some("lastName"));
        }
        other => panic!("意外的错误: {other}"),
    }
}

/// 整值参数收到整个输入对象，由手写编解码器推导角色。
#[test]
fn whole_value_parameter_sees_the_entire_object() {
    let registry = registry();
    let admin: Account = registry
        .decode(&ty("Account"), &json!({ "id": "a-1", "admin": true }))
        .unwrap()
        .expect("输入非空");
    assert_eq!(admin.role, Role::Admin);
    assert_eq!(admin.id, "a-1");

    let normal: Account = registry
        .decode(&ty("Account"), &json!({ "id": "a-2", "admin": false }))
        .unwrap()
        .expect("输入非空");
    assert_eq!(normal.role, Role::Normal);

    let tree = registry.encode(&ty("Account"), Some(&admin)).unwrap();
    assert_eq!(tree, json!({ "id": "a-1", "admin": true }));
}

/// `null` 两个方向都短路：解码为空值，空值编码为 `null`。
#[test]
fn null_short_circuits_both_directions() {
    let registry = registry();
    assert!(registry.decode::<User>(&ty("User"), &Value::Null).unwrap().is_none());
    assert_eq!(registry.encode::<User>(&ty("User"), None).unwrap(), Value::Null);
}

/// 空值编码不调用任何访问器，非空值每个访问器恰好调用一次。
#[test]
fn null_encode_invokes_no_accessor() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registry = support::builder()
        .metadata(
            TypeMetadata::new("Tally")
                .accessor(
                    AccessorMeta::computed("upper", TypeExpr::of("String"), move |user: &User| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        user.name.to_uppercase()
                    })
                    .write_as("upper"),
                )
                .accessor(AccessorMeta::field("name", TypeExpr::of("String"), |user: &User| &user.name).write_as("name")),
        )
        .build();

    assert_eq!(registry.encode::<User>(&ty("Tally"), None).unwrap(), Value::Null);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let tree = registry.encode(&ty("Tally"), Some(&User::new("Mike", "G"))).unwrap();
    assert_eq!(tree, json!({ "upper": "MIKE", "name": "Mike" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// 嵌套成员的形状错误携带成员路径。
#[test]
fn wrong_member_shape_reports_member_path() {
    let registry = registry();
    let err = registry
        .decode::<User>(&ty("User"), &json!({ "firstName": 7, "lastName": "G" }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(err.code(), codes::DECODE_UNEXPECTED_SHAPE);
    assert_eq!(err.path().iter().map(|m| &**m).collect::<Vec<_>>(), ["firstName"]);

    let err = registry.decode::<User>(&ty("User"), &json!(["Mike"])).unwrap_err();
    assert!(matches!(
        err,
        CodecError::Decode(DecodeError::UnexpectedShape { actual: "array", .. })
    ));
}

/// 只写类型不能解码，只读类型不能编码。
#[test]
fn one_sided_codecs_reject_the_missing_direction() {
    let registry = registry();
    let err = registry
        .decode::<support::Envelope>(&ty("Envelope"), &json!({ "id": "e" }))
        .unwrap_err();
    assert!(matches!(err, CodecError::Usage(UsageError::WriteOnly { .. })));

    let token = TypeMetadata::new("Token").constructor(
        ConstructorMeta::new("Token(value)", |args: &mut Args| Ok(args.take::<String>(0)?))
            .read()
            .param(ParamMeta::new(TypeExpr::of("String")).read_as("value")),
    );
    let registry = CodecRegistry::builder().metadata(token).build();
    let decoded: String = registry
        .decode(&ty("Token"), &json!({ "value": "t-1" }))
        .unwrap()
        .expect("输入非空");
    assert_eq!(decoded, "t-1");
    let err = registry.encode(&ty("Token"), Some(&decoded)).unwrap_err();
    assert!(matches!(err, CodecError::Usage(UsageError::ReadOnly { .. })));
}

/// 成员类型没有任何来源时，错误在首次使用该成员时暴露并带上路径。
#[test]
fn member_without_codec_source_fails_at_first_use() {
    let registry = CodecRegistry::builder().metadata(support::account_metadata()).build();
    let account = Account {
        id: "a".to_owned(),
        role: Role::Normal,
    };
    let err = registry.encode(&ty("Account"), Some(&account)).unwrap_err();
    assert_eq!(err.code(), codes::USAGE_UNSUPPORTED);
    assert_eq!(err.path().iter().map(|m| &**m).collect::<Vec<_>>(), ["role"]);
}

/// 编码时传入的实例类型与描述符不符。
#[test]
fn encoding_a_foreign_instance_is_a_type_mismatch() {
    let registry = registry();
    let err = registry
        .encode(&ty("User"), Some(&"not a user".to_owned()))
        .unwrap_err();
    assert!(matches!(err, CodecError::Usage(UsageError::TypeMismatch { .. })));
}
