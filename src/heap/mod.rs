//! # Live Value Model
//!
//! Arena model of the JavaScript value graph a host hands to the
//! serializer. Primitives are inline in [`Value`]; everything with
//! identity (objects, functions, symbols) lives in the [`Heap`] behind a
//! stable [`ObjectId`]. Property descriptors are stored in insertion order
//! since JS key order is observable.
//!
//! Function objects carry the text `Function.prototype.toString()` returns
//! in the host (instrumented source, tracker comment included) plus the
//! scope snapshot the host's tracker recorded for the instance.

use indexmap::IndexMap;

#[cfg(test)]
mod tests;

pub type ObjectId = u32;

/// A JavaScript value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Decimal digits, no `n` suffix.
    BigInt(String),
    Str(String),
    Object(ObjectId),
}

impl Value {
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }
}

/// Own-property name: string or symbol. Reflect.ownKeys order is modeled
/// by keeping string keys ahead of symbol keys in the property map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyName {
    Str(String),
    Symbol(ObjectId),
}

impl PropertyName {
    pub fn str(name: impl Into<String>) -> Self {
        PropertyName::Str(name.into())
    }
}

/// Full own-property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub get: Option<Value>,
    pub set: Option<Value>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Plain assignment-produced data property.
    pub fn data(value: Value) -> Self {
        Self {
            value: Some(value),
            get: None,
            set: None,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn accessor(get: Option<Value>, set: Option<Value>) -> Self {
        Self {
            value: None,
            get,
            set,
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Matches what plain assignment would have produced.
    pub fn is_default_data(&self) -> bool {
        !self.is_accessor() && self.writable && self.enumerable && self.configurable
    }
}

/// Prototype slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prototype {
    /// The default for the object's kind (`Object.prototype`,
    /// `Array.prototype`, …).
    Default,
    Null,
    Object(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl TypedArrayKind {
    pub fn constructor_name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    EvalError,
    UriError,
}

impl ErrorKind {
    pub fn constructor_name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::UriError => "URIError",
        }
    }
}

/// One enclosing scope's values as reported by the tracker for a function
/// instance, aligned with the metadata comment's scope list.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeSnapshot {
    /// Runtime scope id, unique per scope instantiation.
    pub scope_id: u32,
    /// Static block id from the tracker metadata.
    pub block_id: u32,
    /// `(name, value)` pairs in metadata order.
    pub values: Vec<(String, Value)>,
}

/// Host-recorded data for a function object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionData {
    /// `toString()` output: instrumented source with the tracker comment.
    pub source: String,
    /// Scope snapshot, outermost first. Populated by the host when the
    /// function instance was observed.
    pub scopes: Vec<ScopeSnapshot>,
    pub name: String,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Plain,
    Array {
        /// `.length`, which may exceed the highest index + 1.
        length: u32,
    },
    Function(FunctionData),
    Date {
        timestamp_ms: f64,
    },
    RegExp {
        pattern: String,
        flags: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    Map {
        entries: Vec<(Value, Value)>,
    },
    Set {
        entries: Vec<Value>,
    },
    /// Entries are `None` when the weak-collection shim was not installed
    /// in the host; such values cannot be serialized.
    WeakMap {
        entries: Option<Vec<(Value, Value)>>,
    },
    WeakSet {
        entries: Option<Vec<Value>>,
    },
    ArrayBuffer {
        bytes: Vec<u8>,
    },
    SharedArrayBuffer {
        bytes: Vec<u8>,
    },
    TypedArray {
        kind: TypedArrayKind,
        elements: Vec<f64>,
    },
    /// Node `Buffer`.
    Buffer {
        bytes: Vec<u8>,
    },
    BoxedString(String),
    BoxedNumber(f64),
    BoxedBoolean(bool),
    BoxedBigInt(String),
    BoxedSymbol(ObjectId),
    Symbol {
        description: Option<String>,
        /// `Symbol.for` registry key; identity survives realms.
        global_key: Option<String>,
        /// Name of a well-known symbol (`toStringTag`, `iterator`, …).
        well_known: Option<String>,
    },
    Promise,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    pub kind: ObjectKind,
    pub properties: IndexMap<PropertyName, PropertyDescriptor>,
    pub prototype: Prototype,
    pub extensible: bool,
}

impl HeapObject {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            prototype: Prototype::Default,
            extensible: true,
        }
    }

    pub fn function_data(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }
}

/// Arena of heap objects.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: ObjectKind) -> ObjectId {
        let id = self.objects.len() as ObjectId;
        self.objects.push(HeapObject::new(kind));
        id
    }

    pub fn object(&self, id: ObjectId) -> &HeapObject {
        &self.objects[id as usize]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut HeapObject {
        &mut self.objects[id as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // Builders used by hosts and tests.

    pub fn alloc_plain(&mut self) -> ObjectId {
        self.alloc(ObjectKind::Plain)
    }

    /// Dense array from element values.
    pub fn alloc_array(&mut self, elements: Vec<Value>) -> ObjectId {
        let length = elements.len() as u32;
        let id = self.alloc(ObjectKind::Array { length });
        for (index, element) in elements.into_iter().enumerate() {
            self.object_mut(id).properties.insert(
                PropertyName::Str(index.to_string()),
                PropertyDescriptor::data(element),
            );
        }
        id
    }

    pub fn alloc_function(&mut self, data: FunctionData) -> ObjectId {
        self.alloc(ObjectKind::Function(data))
    }

    pub fn alloc_symbol(&mut self, description: Option<&str>) -> ObjectId {
        self.alloc(ObjectKind::Symbol {
            description: description.map(str::to_string),
            global_key: None,
            well_known: None,
        })
    }

    pub fn alloc_global_symbol(&mut self, key: &str) -> ObjectId {
        self.alloc(ObjectKind::Symbol {
            description: Some(key.to_string()),
            global_key: Some(key.to_string()),
            well_known: None,
        })
    }

    pub fn alloc_well_known_symbol(&mut self, name: &str) -> ObjectId {
        self.alloc(ObjectKind::Symbol {
            description: Some(format!("Symbol.{name}")),
            global_key: None,
            well_known: Some(name.to_string()),
        })
    }

    /// Sets a plain data property, mirroring assignment.
    pub fn set_prop(&mut self, object: ObjectId, name: &str, value: Value) {
        self.object_mut(object)
            .properties
            .insert(PropertyName::str(name), PropertyDescriptor::data(value));
        if let ObjectKind::Array { length } = &mut self.objects[object as usize].kind {
            if let Ok(index) = name.parse::<u32>() {
                if index >= *length {
                    *length = index + 1;
                }
            }
        }
    }

    pub fn define_prop(
        &mut self,
        object: ObjectId,
        name: PropertyName,
        descriptor: PropertyDescriptor,
    ) {
        self.object_mut(object).properties.insert(name, descriptor);
    }
}
