//! Value model tests: equality, table keys, borders, traversal, rendering

use ay_lang::runtime::value::{float_to_int, format_float};
use ay_lang::runtime::{ErrorKind, Table, Value};
use pretty_assertions::assert_eq;

fn s(text: &str) -> Value {
    Value::from(text)
}

// ── Equality ────────────────────────────────────────────────

#[test]
fn numbers_compare_by_mathematical_value() {
    assert_eq!(Value::Int(1), Value::Float(1.0));
    assert_ne!(Value::Int(1), Value::Float(1.5));
    assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    // 2^53 + 1 has no float image.
    assert_ne!(Value::Int((1 << 53) + 1), Value::Float((1u64 << 53) as f64));
}

#[test]
fn strings_compare_by_content_tables_by_identity() {
    assert_eq!(s("abc"), Value::from(String::from("abc")));
    assert_ne!(s("1"), Value::Int(1));
    let t = Value::new_table();
    assert_eq!(t, t.clone());
    assert_ne!(Value::new_table(), Value::new_table());
}

#[test]
fn truthiness() {
    assert!(!Value::Nil.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Int(0).is_truthy());
    assert!(s("").is_truthy());
}

#[test]
fn type_names() {
    let names: Vec<&str> = [
        Value::Nil,
        Value::Bool(true),
        Value::Int(1),
        Value::Float(1.0),
        s("x"),
        Value::new_table(),
    ]
    .iter()
    .map(Value::type_name)
    .collect();
    assert_eq!(names, vec!["nil", "boolean", "number", "number", "string", "table"]);
}

// ── Table keys ──────────────────────────────────────────────

#[test]
fn integral_float_keys_normalize() {
    let mut t = Table::new();
    t.put(Value::Float(2.0), s("two")).unwrap();
    assert_eq!(t.get(&Value::Int(2)), s("two"));
    t.put(Value::Int(2), s("deux")).unwrap();
    assert_eq!(t.get(&Value::Float(2.0)), s("deux"));
    assert_eq!(t.count(), 1);
    // A fractional float is its own key.
    t.put(Value::Float(2.5), s("x")).unwrap();
    assert_eq!(t.get(&Value::Int(2)), s("deux"));
}

#[test]
fn nil_and_nan_keys_are_rejected() {
    let mut t = Table::new();
    assert_eq!(t.put(Value::Nil, Value::Int(1)).unwrap_err().kind(), ErrorKind::Type);
    assert_eq!(
        t.put(Value::Float(f64::NAN), Value::Int(1)).unwrap_err().kind(),
        ErrorKind::Domain
    );
    // Reading them is fine and yields nil.
    assert_eq!(t.get(&Value::Nil), Value::Nil);
    assert_eq!(t.get(&Value::Float(f64::NAN)), Value::Nil);
}

#[test]
fn assigning_nil_removes() {
    let mut t = Table::new();
    t.set_str("a", Value::Int(1));
    t.set_str("a", Value::Nil);
    assert!(!t.has(&s("a")));
    assert_eq!(t.count(), 0);
    assert_eq!(t.iter().count(), 0);
}

// ── Borders ─────────────────────────────────────────────────

#[test]
fn sequence_border() {
    let t = Table::from_sequence((1..=5).map(Value::Int));
    assert_eq!(t.border(), 5);
    assert_eq!(Table::new().border(), 0);
}

#[test]
fn border_with_hole_is_a_valid_border() {
    let mut t = Table::from_sequence((1..=4).map(Value::Int));
    t.set_int(3, Value::Nil);
    let n = t.border();
    assert!(n == 2 || n == 4, "border {}", n);
    assert!(!t.get_int(n).is_nil());
    assert!(t.get_int(n + 1).is_nil());
}

#[test]
fn border_ignores_hash_part() {
    let mut t = Table::new();
    t.set_str("x", Value::Int(1));
    t.set_int(1, Value::Int(1));
    t.set_int(2, Value::Int(2));
    assert_eq!(t.border(), 2);
    let mut no_one = Table::new();
    no_one.set_int(2, Value::Int(2));
    assert_eq!(no_one.border(), 0);
}

#[test]
fn border_of_mixed_table_grows_with_appends() {
    let mut t = Table::new();
    t.set_str("n", Value::Int(0));
    for i in 1..=100_000 {
        let next = t.border() + 1;
        assert_eq!(next, i);
        t.set_int(next, Value::Int(i));
    }
    assert_eq!(t.border(), 100_000);
    assert_eq!(t.count(), 100_001);
}

#[test]
fn border_search_finds_a_border_past_sparse_keys() {
    let mut t = Table::from_sequence((1..=10).map(Value::Int));
    t.set_int(1_000, Value::Int(1));
    t.set_str("tag", Value::Bool(true));
    let n = t.border();
    assert!(!t.get_int(n).is_nil() && t.get_int(n + 1).is_nil(), "border {}", n);
}

// ── Traversal ───────────────────────────────────────────────

fn keys(t: &Table) -> Vec<Value> {
    let mut out = Vec::new();
    let mut key = Value::Nil;
    while let Some((k, _)) = t.next(&key).unwrap() {
        out.push(k.clone());
        key = k;
    }
    out
}

#[test]
fn next_walks_every_live_entry_once() {
    let mut t = Table::new();
    t.set_str("a", Value::Int(1));
    t.set_int(1, Value::Int(2));
    t.set_str("b", Value::Int(3));
    assert_eq!(keys(&t), vec![s("a"), Value::Int(1), s("b")]);
}

#[test]
fn clearing_during_traversal_is_allowed() {
    let mut t = Table::from_sequence((1..=4).map(Value::Int));
    let mut key = Value::Nil;
    let mut seen = 0;
    while let Some((k, _)) = t.next(&key).unwrap() {
        t.put(k.clone(), Value::Nil).unwrap();
        seen += 1;
        key = k;
    }
    assert_eq!(seen, 4);
    assert_eq!(t.count(), 0);
}

#[test]
fn queue_churn_keeps_order_and_count() {
    let mut t = Table::new();
    let (mut head, mut tail) = (1i64, 0i64);
    for i in 0..200_000i64 {
        tail += 1;
        t.set_int(tail, Value::Int(i));
        if i % 3 != 0 {
            t.set_int(head, Value::Nil);
            head += 1;
        }
    }
    let live = (tail - head + 1) as usize;
    assert_eq!(t.count(), live);
    let walked = keys(&t);
    assert_eq!(walked.len(), live);
    assert_eq!(walked.first(), Some(&Value::Int(head)));
    assert_eq!(walked.last(), Some(&Value::Int(tail)));
}

#[test]
fn next_with_unknown_key_fails() {
    let t = Table::new();
    assert!(t.next(&s("missing")).is_err());
}

// ── Numbers and rendering ───────────────────────────────────

#[test]
fn float_to_int_is_exact() {
    assert_eq!(float_to_int(3.0), Some(3));
    assert_eq!(float_to_int(3.5), None);
    assert_eq!(float_to_int(f64::NAN), None);
    assert_eq!(float_to_int(9_223_372_036_854_775_808.0), None);
    assert_eq!(float_to_int(-9_223_372_036_854_775_808.0), Some(i64::MIN));
}

#[test]
fn float_rendering() {
    assert_eq!(format_float(1.0), "1.0");
    assert_eq!(format_float(0.1), "0.1");
    assert_eq!(format_float(-0.0), "-0.0");
    assert_eq!(format_float(1e100), "1e+100");
    assert_eq!(format_float(f64::INFINITY), "inf");
    assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
}

#[test]
fn value_display() {
    assert_eq!(Value::Int(-7).to_string(), "-7");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
    assert_eq!(Value::Bool(true).to_string(), "true");
    assert_eq!(Value::Nil.to_string(), "nil");
    assert_eq!(s("hi").to_string(), "hi");
}

#[test]
fn metatables_attach_to_tables_and_userdata() {
    let t = Value::new_table();
    let mt = Value::new_table();
    t.set_metatable(mt.as_table().cloned()).unwrap();
    assert_eq!(t.raw_metatable().map(Value::from), Some(mt.clone()));

    let u = Value::new_userdata(7u32);
    assert!(u.raw_metatable().is_none());
    u.set_metatable(mt.as_table().cloned()).unwrap();
    assert_eq!(u.raw_metatable().map(Value::from), Some(mt));

    assert!(Value::Int(1).set_metatable(None).is_err());
    let err = Value::new_thread("co").set_metatable(None).unwrap_err();
    assert_eq!(err.to_string(), "cannot set the metatable of a thread value");
}

#[test]
fn userdata_and_threads_compare_by_identity() {
    let u = Value::new_userdata(String::from("payload"));
    assert_eq!(u, u.clone());
    assert_ne!(u, Value::new_userdata(String::from("payload")));
    assert_eq!(u.type_name(), "userdata");
    assert!(u.to_string().starts_with("userdata: 0x"));

    let co = Value::new_thread("worker");
    assert_eq!(co, co.clone());
    assert_ne!(co, Value::new_thread("worker"));
    assert_eq!(co.type_name(), "thread");
    assert!(co.to_string().starts_with("thread: 0x"));
}

#[test]
fn userdata_payload_is_reachable_by_type() {
    let u = Value::new_userdata(vec![1u8, 2, 3]);
    let data = u.as_userdata().unwrap();
    assert_eq!(data.with(|v: &mut Vec<u8>| v.len()), Some(3));
    data.with(|v: &mut Vec<u8>| v.push(4));
    assert_eq!(data.with(|v: &mut Vec<u8>| v.clone()), Some(vec![1, 2, 3, 4]));
    assert_eq!(data.with(|_: &mut String| ()), None);
}
