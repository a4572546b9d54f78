use super::*;

#[test]
fn version_keeps_the_leading_number() {
    assert_eq!(trim_version("10.11.6-MariaDB"), "10.11.6");
    assert_eq!(trim_version("8.0.36-0ubuntu0.22.04.1"), "8.0.36");
    assert_eq!(trim_version("8.4.0"), "8.4.0");
    assert_eq!(trim_version(""), "");
}

#[test]
fn integer_kinds_follow_signedness() {
    assert_eq!(column_kind("BOOLEAN"), ColumnKind::Bool);
    assert_eq!(column_kind("TINYINT"), ColumnKind::Signed);
    assert_eq!(column_kind("BIGINT"), ColumnKind::Signed);
    assert_eq!(column_kind("INT UNSIGNED"), ColumnKind::Unsigned);
    assert_eq!(column_kind("BIGINT UNSIGNED"), ColumnKind::Unsigned);
    assert_eq!(column_kind("YEAR"), ColumnKind::Unsigned);
    assert_eq!(column_kind("BIT"), ColumnKind::Unsigned);
}

#[test]
fn decimals_and_floats_are_distinct() {
    assert_eq!(column_kind("DECIMAL"), ColumnKind::Decimal);
    assert_eq!(column_kind("FLOAT"), ColumnKind::Float);
    assert_eq!(column_kind("DOUBLE"), ColumnKind::Double);
}

#[test]
fn temporal_and_binary_kinds() {
    assert_eq!(column_kind("DATE"), ColumnKind::Date);
    assert_eq!(column_kind("TIME"), ColumnKind::Time);
    assert_eq!(column_kind("DATETIME"), ColumnKind::DateTime);
    assert_eq!(column_kind("TIMESTAMP"), ColumnKind::Timestamp);
    assert_eq!(column_kind("JSON"), ColumnKind::Json);
    assert_eq!(column_kind("VARBINARY"), ColumnKind::Binary);
    assert_eq!(column_kind("LONGBLOB"), ColumnKind::Binary);
}

#[test]
fn text_types_fall_through() {
    assert_eq!(column_kind("VARCHAR"), ColumnKind::Other);
    assert_eq!(column_kind("TEXT"), ColumnKind::Other);
    assert_eq!(column_kind("ENUM"), ColumnKind::Other);
    assert_eq!(column_kind("SET"), ColumnKind::Other);
}
