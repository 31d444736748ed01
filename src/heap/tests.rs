//! # Heap Model Tests

use crate::heap::*;

#[test]
fn array_builder_sets_indices_and_length() {
    let mut heap = Heap::new();
    let arr = heap.alloc_array(vec![Value::Number(1.0), Value::Str("x".to_string())]);
    let object = heap.object(arr);
    assert_eq!(object.kind, ObjectKind::Array { length: 2 });
    assert_eq!(
        object.properties.get(&PropertyName::str("0")),
        Some(&PropertyDescriptor::data(Value::Number(1.0)))
    );
}

#[test]
fn set_prop_extends_array_length() {
    let mut heap = Heap::new();
    let arr = heap.alloc_array(vec![]);
    heap.set_prop(arr, "9", Value::Bool(true));
    assert_eq!(heap.object(arr).kind, ObjectKind::Array { length: 10 });
}

#[test]
fn default_data_descriptor_detection() {
    let desc = PropertyDescriptor::data(Value::Null);
    assert!(desc.is_default_data());
    let mut hidden = desc.clone();
    hidden.enumerable = false;
    assert!(!hidden.is_default_data());
    let accessor = PropertyDescriptor::accessor(Some(Value::Undefined), None);
    assert!(accessor.is_accessor());
}

#[test]
fn symbols_carry_identity() {
    let mut heap = Heap::new();
    let a = heap.alloc_symbol(Some("s"));
    let b = heap.alloc_symbol(Some("s"));
    assert_ne!(a, b, "same description, distinct identity");
    let g = heap.alloc_global_symbol("k");
    match &heap.object(g).kind {
        ObjectKind::Symbol { global_key, .. } => {
            assert_eq!(global_key.as_deref(), Some("k"));
        }
        other => panic!("unexpected kind {other:?}"),
    }
}
