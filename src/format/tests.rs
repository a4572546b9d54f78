use super::*;
use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::types::Decimal;
use std::str::FromStr;
use serde_json::json;
use tempfile::TempDir;

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

#[test]
fn value_rendering() {
    assert_eq!(format_value(&CellValue::Null), "NULL");
    assert_eq!(format_value(&CellValue::Bool(true)), "True");
    assert_eq!(format_value(&CellValue::Int(-4)), "-4");
    assert_eq!(format_value(&CellValue::Float(2.0)), "2.0");
    assert_eq!(format_value(&CellValue::Float(0.25)), "0.25");
    assert_eq!(format_value(&CellValue::Bytes(vec![0, 255])), "0x00ff");
    assert_eq!(
        format_value(&CellValue::Json(json!({"a": [1, null]}))),
        r#"{"a":[1,null]}"#
    );
    assert_eq!(
        format_value(&CellValue::Unsupported("GEOMETRY".to_string())),
        "<unsupported GEOMETRY value>"
    );
}

#[test]
fn floats_follow_python_repr() {
    assert_eq!(format_value(&CellValue::Float(1e15)), "1000000000000000.0");
    assert_eq!(format_value(&CellValue::Float(1e16)), "1e+16");
    assert_eq!(format_value(&CellValue::Float(1e20)), "1e+20");
    assert_eq!(format_value(&CellValue::Float(-1.2345e20)), "-1.2345e+20");
    assert_eq!(format_value(&CellValue::Float(0.0001)), "0.0001");
    assert_eq!(format_value(&CellValue::Float(1e-5)), "1e-05");
    assert_eq!(format_value(&CellValue::Float(1.5e-7)), "1.5e-07");
    assert_eq!(format_value(&CellValue::Float(0.0)), "0.0");
    assert_eq!(format_value(&CellValue::Float(f64::NAN)), "nan");
    assert_eq!(format_value(&CellValue::Float(f64::NEG_INFINITY)), "-inf");
}

#[test]
fn decimals_keep_their_scale() {
    let price = Decimal::from_str("1234.50").expect("valid decimal");
    assert_eq!(format_value(&CellValue::Decimal(price)), "1234.50");
}

#[test]
fn intervals_render_like_timedelta() {
    let interval = |months, days, microseconds| CellValue::Interval {
        months,
        days,
        microseconds,
    };

    assert_eq!(format_value(&interval(0, 0, 3_723_000_000)), "1:02:03");
    assert_eq!(format_value(&interval(0, 1, 0)), "1 day, 0:00:00");
    assert_eq!(format_value(&interval(1, 2, 500_000)), "32 days, 0:00:00.500000");
    assert_eq!(format_value(&interval(12, 0, 0)), "365 days, 0:00:00");
    assert_eq!(format_value(&interval(0, 0, -1_000_000)), "-1 day, 23:59:59");
}

#[test]
fn money_time_zones_and_arrays() {
    assert_eq!(format_value(&CellValue::Money(123_456)), "$1,234.56");
    assert_eq!(format_value(&CellValue::Money(-5)), "-$0.05");
    assert_eq!(format_value(&CellValue::Money(100_000_000)), "$1,000,000.00");

    let time = NaiveTime::from_hms_opt(12, 34, 56).expect("valid time");
    let offset = FixedOffset::east_opt(2 * 3600).expect("valid offset");
    assert_eq!(
        format_value(&CellValue::TimeTz(time, offset)),
        "12:34:56+02:00"
    );

    let numbers = CellValue::Array(vec![CellValue::Int(1), CellValue::Null, CellValue::Int(3)]);
    assert_eq!(format_value(&numbers), "[1, None, 3]");

    let words = CellValue::Array(vec![
        CellValue::Text("a".to_string()),
        CellValue::Text("it's".to_string()),
    ]);
    assert_eq!(format_value(&words), r#"['a', "it's"]"#);
    assert_eq!(format_value(&CellValue::Array(Vec::new())), "[]");
}

#[test]
fn dates_render_as_iso_8601() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
    assert_eq!(format_value(&CellValue::Date(date)), "2024-02-29");

    let whole = date.and_hms_opt(13, 5, 9).expect("valid time");
    assert_eq!(
        format_value(&CellValue::DateTime(whole)),
        "2024-02-29T13:05:09"
    );

    let fractional = date.and_hms_micro_opt(13, 5, 9, 120).expect("valid time");
    assert_eq!(
        format_value(&CellValue::DateTime(fractional)),
        "2024-02-29T13:05:09.000120"
    );

    let zoned = Utc
        .with_ymd_and_hms(2024, 2, 29, 13, 5, 9)
        .single()
        .expect("valid timestamp");
    assert_eq!(
        format_value(&CellValue::DateTimeTz(zoned)),
        "2024-02-29T13:05:09+00:00"
    );
}

#[test]
fn results_render_vertically() {
    let (displayed, output) = format_results(
        &columns(&["id", "name"]),
        &[
            vec![CellValue::Int(1), CellValue::Text("Ada".to_string())],
            vec![CellValue::Int(2), CellValue::Null],
        ],
        4000,
    );

    assert_eq!(displayed, 2);
    assert_eq!(
        output,
        "1. row\nid: 1\nname: Ada\n\n2. row\nid: 2\nname: NULL\n\n"
    );
}

#[test]
fn results_stop_before_exceeding_budget() {
    let rows: Vec<Vec<CellValue>> = (1..=3).map(|i| vec![CellValue::Int(i)]).collect();
    // Each block is "N. row\nx: N\n\n" = 13 characters
    let (displayed, output) = format_results(&columns(&["x"]), &rows, 26);
    assert_eq!(displayed, 2);
    assert_eq!(output.chars().count(), 26);

    let (displayed, output) = format_results(&columns(&["x"]), &rows, 25);
    assert_eq!(displayed, 1);
    assert_eq!(output, "1. row\nx: 1\n\n");
}

#[test]
fn budget_counts_characters_not_bytes() {
    let rows = vec![vec![CellValue::Text("ééé".to_string())]];
    // "1. row\nv: ééé\n\n" is 15 characters and 18 bytes
    let (displayed, _) = format_results(&columns(&["v"]), &rows, 15);
    assert_eq!(displayed, 1);
}

#[test]
fn first_row_too_large_displays_nothing() {
    let rows = vec![vec![CellValue::Text("x".repeat(100))]];
    let (displayed, output) = format_results(&columns(&["v"]), &rows, 10);
    assert_eq!(displayed, 0);
    assert!(output.is_empty());
}

#[test]
fn schema_with_relationships() {
    let table_columns = vec![
        ColumnInfo {
            name: "id".to_string(),
            data_type: "INTEGER".to_string(),
            nullable: false,
            default: None,
            autoincrement: true,
        },
        ColumnInfo {
            name: "customer_id".to_string(),
            data_type: "INTEGER".to_string(),
            nullable: false,
            default: None,
            autoincrement: false,
        },
        ColumnInfo {
            name: "status".to_string(),
            data_type: "VARCHAR(10)".to_string(),
            nullable: true,
            default: Some("'new'".to_string()),
            autoincrement: false,
        },
    ];
    let keys = vec![ForeignKey {
        constrained_columns: vec!["customer_id".to_string()],
        referred_table: "customers".to_string(),
        referred_columns: vec!["id".to_string()],
    }];

    let schema = format_table_schema("orders", &table_columns, &["id".to_string()], &keys);

    assert_eq!(
        schema,
        "orders:\n\
         \x20   id: primary key, INTEGER, autoincrement\n\
         \x20   customer_id: INTEGER\n\
         \x20   status: VARCHAR(10), nullable, default='new'\n\
         \n\
         \x20   Relationships:\n\
         \x20     customer_id -> customers.id"
    );
}

#[test]
fn schema_without_relationships() {
    let schema = format_table_schema(
        "tags",
        &[ColumnInfo {
            name: "label".to_string(),
            data_type: "TEXT".to_string(),
            nullable: true,
            default: None,
            autoincrement: false,
        }],
        &[],
        &[],
    );

    assert_eq!(schema, "tags:\n    label: TEXT, nullable");
}

#[tokio::test]
async fn full_results_are_content_addressed() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let rows = vec![
        vec![CellValue::Int(1), CellValue::Null],
        vec![CellValue::Int(2), CellValue::Text("b".to_string())],
    ];

    let message = save_full_results(temp_dir.path(), &rows).await?;
    let again = save_full_results(temp_dir.path(), &rows).await?;
    assert_eq!(message, again);

    let files: Vec<_> = std::fs::read_dir(temp_dir.path())?.collect::<Result<_, _>>()?;
    assert_eq!(files.len(), 1);

    let file_name = files[0].file_name().to_string_lossy().to_string();
    assert!(file_name.ends_with(".json"));
    assert_eq!(file_name.len(), 64 + ".json".len());
    assert!(message.starts_with(&format!(
        "\nFull result set url: {}/{}",
        LOCAL_FILES_URL_BASE, file_name
    )));

    let raw = std::fs::read_to_string(files[0].path())?;
    assert_eq!(raw, r#"[["1", "NULL"], ["2", "b"]]"#);
    assert_eq!(
        file_name,
        format!("{:x}.json", Sha256::digest(raw.as_bytes()))
    );

    Ok(())
}

#[test]
fn saved_json_matches_python_dumps() -> anyhow::Result<()> {
    let data = vec![vec!["caf\u{e9}".to_string(), "\u{1f600}".to_string(), "a\"b".to_string()]];
    assert_eq!(
        to_python_json(&data)?,
        r#"[["caf\u00e9", "\ud83d\ude00", "a\"b"]]"#
    );

    let object = json!({"k": [1, 2]});
    assert_eq!(to_python_json(&object)?, r#"{"k": [1, 2]}"#);
    Ok(())
}
