use super::*;
use serde_json::json;

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be an object"),
    }
}

#[test]
fn question_style_binds_in_order() {
    let bound = bind_named(
        "SELECT * FROM users WHERE id = :id AND name = :name OR id = :id",
        &params(json!({"id": 7, "name": "bob"})),
        PlaceholderStyle::Question,
    )
    .expect("binds");

    assert_eq!(
        bound.sql,
        "SELECT * FROM users WHERE id = ? AND name = ? OR id = ?"
    );
    assert_eq!(
        bound.values,
        vec![
            BindValue::Int(7),
            BindValue::Text("bob".to_string()),
            BindValue::Int(7)
        ]
    );
    assert_eq!(bound.names, vec!["id", "name", "id"]);
}

#[test]
fn numbered_style_reuses_indexes() {
    let bound = bind_named(
        "SELECT :a, :b, :a",
        &params(json!({"a": true, "b": 1.5})),
        PlaceholderStyle::Numbered,
    )
    .expect("binds");

    assert_eq!(bound.sql, "SELECT $1, $2, $1");
    assert_eq!(
        bound.values,
        vec![BindValue::Bool(true), BindValue::Float(1.5)]
    );
    assert_eq!(bound.names, vec!["a", "b"]);
}

#[test]
fn casts_and_times_are_not_placeholders() {
    let bound = bind_named(
        "SELECT created_at::date, 12:30 FROM t",
        &Params::new(),
        PlaceholderStyle::Numbered,
    )
    .expect("binds");

    assert_eq!(bound.sql, "SELECT created_at::date, 12:30 FROM t");
    assert!(bound.values.is_empty());
}

#[test]
fn quoted_text_and_comments_are_skipped() {
    let query = "SELECT ':not_a_param', \"col:x\" -- :also_not\nFROM t /* :nor_this */ WHERE a = :a";
    let bound = bind_named(query, &params(json!({"a": null})), PlaceholderStyle::Question)
        .expect("binds");

    assert_eq!(
        bound.sql,
        "SELECT ':not_a_param', \"col:x\" -- :also_not\nFROM t /* :nor_this */ WHERE a = ?"
    );
    assert_eq!(bound.values, vec![BindValue::Null]);
}

#[test]
fn escaped_colon_is_literal() {
    let bound = bind_named(r"SELECT 1 AS \:label", &Params::new(), PlaceholderStyle::Question)
        .expect("binds");

    assert_eq!(bound.sql, "SELECT 1 AS :label");
}

#[test]
fn missing_parameter_is_an_error() {
    let err = bind_named(
        "SELECT * FROM t WHERE id = :id",
        &Params::new(),
        PlaceholderStyle::Question,
    )
    .expect_err("missing value");

    assert_eq!(
        err.to_string(),
        "A value is required for bind parameter 'id'"
    );
}

#[test]
fn structured_values_bind_as_json_text() {
    let bound = bind_named(
        "INSERT INTO t (doc) VALUES (:doc)",
        &params(json!({"doc": {"k": [1, 2]}, "unused": 3})),
        PlaceholderStyle::Question,
    )
    .expect("binds");

    assert_eq!(
        bound.values,
        vec![BindValue::Text(r#"{"k":[1,2]}"#.to_string())]
    );
}

#[test]
fn doubled_quote_inside_literal() {
    let bound = bind_named(
        "SELECT 'it''s :x' , :y",
        &params(json!({"y": "v"})),
        PlaceholderStyle::Question,
    )
    .expect("binds");

    assert_eq!(bound.sql, "SELECT 'it''s :x' , ?");
}
