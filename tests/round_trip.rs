use chrono::NaiveDate;
use sqlx_format_bind::prelude::*;
use sqlx_format_bind::{first, Decimal};
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq)]
struct Sample {
    flag: bool,
    byte: u8,
    letter: char,
    small: i16,
    medium: i32,
    large: i64,
    ratio: f64,
    amount: Decimal,
    label: String,
    blob: Vec<u8>,
    created: chrono::NaiveDateTime,
    key: Uuid,
    note: Option<String>,
}

impl Entity for Sample {
    fn describe(d: &mut DescriptorBuilder<Self>) {
        d.field("flag", |s| &mut s.flag)
            .field("byte", |s| &mut s.byte)
            .field("letter", |s| &mut s.letter)
            .field("small", |s| &mut s.small)
            .field("medium", |s| &mut s.medium)
            .field("large", |s| &mut s.large)
            .field("ratio", |s| &mut s.ratio)
            .field("amount", |s| &mut s.amount)
            .field("label", |s| &mut s.label)
            .field("blob", |s| &mut s.blob)
            .field("created", |s| &mut s.created)
            .field("key", |s| &mut s.key)
            .field("note", |s| &mut s.note);
    }
}

const COLUMNS: [&str; 13] = [
    "flag", "byte", "letter", "small", "medium", "large", "ratio", "amount", "label", "blob",
    "created", "key", "note",
];

fn row() -> Vec<Value> {
    let created = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_milli_opt(13, 45, 10, 250))
        .unwrap();
    vec![
        Value::Bool(true),
        Value::Byte(200),
        Value::Char('λ'),
        Value::Int16(-12),
        Value::Int32(70_000),
        Value::Int64(-9_000_000_000),
        Value::Double(0.125),
        Value::Decimal("1234.5600".parse().unwrap()),
        Value::Text("O'Brien".into()),
        Value::Bytes(vec![0, 1, 254, 255]),
        Value::DateTime(created),
        Value::Guid(Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0)),
        Value::Null,
    ]
}

#[test]
fn materialized_row_rebinds_unchanged() {
    let mut rows = RowSet::new(COLUMNS).with_row(row()).unwrap();
    let sample: Sample = first(&mut rows).unwrap().unwrap();

    let template = template!(
        "INSERT INTO samples VALUES ({0}, {1}, {2}, {3}, {4}, {5}, {6}, {7}, {8}, {9}, {10}, {11}, {12})",
        sample.flag,
        sample.byte,
        sample.letter,
        sample.small,
        sample.medium,
        sample.large,
        sample.ratio,
        sample.amount,
        sample.label,
        sample.blob,
        sample.created,
        sample.key,
        sample.note,
    );
    let statement = Binder::new().unwrap().compile(&template, "MySQL").unwrap();

    assert_eq!(statement.text().matches('?').count(), COLUMNS.len());
    let rebound: Vec<Value> = statement
        .parameters()
        .iter()
        .map(|p| p.value().clone())
        .collect();
    assert_eq!(rebound, row());
}

#[test]
fn materialize_then_filter_by_collected_keys() {
    let mut rows = RowSet::new(["id", "name"])
        .with_row([Value::Int32(4), Value::Text("a".into())])
        .unwrap()
        .with_row([Value::Int32(9), Value::Text("b".into())])
        .unwrap();

    #[derive(Default)]
    struct Item {
        id: i32,
    }

    impl Entity for Item {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.field("Id", |i| &mut i.id);
        }
    }

    let ids: Vec<i32> = materialize_all::<Item, _>(&mut rows)
        .map(|item| item.map(|i| i.id))
        .collect::<Result<_>>()
        .unwrap();

    let statement = Binder::new()
        .unwrap()
        .compile(&template!("DELETE FROM items WHERE id IN ({0})", ids), "PostgreSQL")
        .unwrap();
    assert_eq!(statement.text(), "DELETE FROM items WHERE id IN ($1,$2)");
    assert_eq!(
        statement.parameters().iter().map(|p| p.value().clone()).collect::<Vec<_>>(),
        vec![Value::Int32(4), Value::Int32(9)]
    );
}
