//! Depth-bounded conversion of arbitrary `Serialize` values into JSON.
//!
//! Works like `serde_json::to_value`, except that every nesting level
//! (sequences, maps, structs, enum variants, `Some` and newtype wrappers)
//! consumes one unit of a fixed budget. A value whose `Serialize` impl
//! follows a reference cycle runs out of budget and yields
//! [`StructureError::TooDeep`] instead of exhausting the stack.
//!
//! Map keys that do not serialize to strings are rendered as compact JSON
//! (`(1, 2)` becomes `"[1,2]"`), so tuple or numeric keys never fail.

use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;

/// Nesting levels allowed before a value is considered unrenderable
pub const MAX_STRUCTURE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum StructureError {
    /// Nesting exceeded [`MAX_STRUCTURE_DEPTH`], usually a reference cycle
    #[error("value nests deeper than {0} levels")]
    TooDeep(usize),

    /// Raised by the value's own `Serialize` impl
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for StructureError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Convert `value` into a JSON tree no deeper than `max_depth`
pub fn to_bounded_value<T>(value: &T, max_depth: usize) -> Result<Value, StructureError>
where
    T: Serialize + ?Sized,
{
    value.serialize(BoundedSerializer {
        remaining: max_depth,
        max_depth,
    })
}

/// Pretty JSON (2-space indent) of a depth-bounded value
pub fn to_bounded_pretty_json<T>(value: &T) -> Result<String, StructureError>
where
    T: Serialize + ?Sized,
{
    let tree = to_bounded_value(value, MAX_STRUCTURE_DEPTH)?;
    serde_json::to_string_pretty(&tree).map_err(|e| StructureError::Custom(e.to_string()))
}

#[derive(Debug, Clone, Copy)]
struct BoundedSerializer {
    remaining: usize,
    max_depth: usize,
}

impl BoundedSerializer {
    fn nested(self) -> Result<Self, StructureError> {
        match self.remaining.checked_sub(1) {
            Some(remaining) => Ok(Self { remaining, ..self }),
            None => Err(StructureError::TooDeep(self.max_depth)),
        }
    }
}

fn variant_object(variant: &'static str, value: Value) -> Value {
    let mut object = Map::new();
    object.insert(variant.to_string(), value);
    Value::Object(object)
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(key) => key,
        other => other.to_string(),
    }
}

impl ser::Serializer for BoundedSerializer {
    type Ok = Value;
    type Error = StructureError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = TupleVariantBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = StructVariantBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, StructureError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, StructureError> {
        Ok(i64::try_from(v)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, StructureError> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, StructureError> {
        Ok(u64::try_from(v)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, StructureError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, StructureError> {
        // Non-finite floats have no JSON form.
        Ok(Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
    }

    fn serialize_char(self, v: char) -> Result<Value, StructureError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, StructureError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, StructureError> {
        Ok(Value::Array(v.iter().map(|byte| Value::from(*byte)).collect()))
    }

    fn serialize_none(self) -> Result<Value, StructureError> {
        Ok(Value::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value, StructureError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self.nested()?)
    }

    fn serialize_unit(self) -> Result<Value, StructureError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, StructureError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, StructureError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value, StructureError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self.nested()?)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, StructureError>
    where
        T: ?Sized + Serialize,
    {
        let inner = value.serialize(self.nested()?)?;
        Ok(variant_object(variant, inner))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, StructureError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
            child: self.nested()?,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, StructureError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder, StructureError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantBuilder, StructureError> {
        Ok(TupleVariantBuilder {
            variant,
            seq: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, StructureError> {
        Ok(MapBuilder {
            map: Map::new(),
            next_key: None,
            child: self.nested()?,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, StructureError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<StructVariantBuilder, StructureError> {
        Ok(StructVariantBuilder {
            variant,
            map: self.serialize_map(Some(len))?,
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
    child: BoundedSerializer,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        self.items.push(value.serialize(self.child)?);
        Ok(())
    }

    fn end(self) -> Result<Value, StructureError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, StructureError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, StructureError> {
        ser::SerializeSeq::end(self)
    }
}

struct TupleVariantBuilder {
    variant: &'static str,
    seq: SeqBuilder,
}

impl ser::SerializeTupleVariant for TupleVariantBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(&mut self.seq, value)
    }

    fn end(self) -> Result<Value, StructureError> {
        let items = ser::SerializeSeq::end(self.seq)?;
        Ok(variant_object(self.variant, items))
    }
}

struct MapBuilder {
    map: Map<String, Value>,
    next_key: Option<String>,
    child: BoundedSerializer,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        self.next_key = Some(key_string(key.serialize(self.child)?));
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| StructureError::Custom("map value without a key".to_string()))?;
        self.map.insert(key, value.serialize(self.child)?);
        Ok(())
    }

    fn end(self) -> Result<Value, StructureError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        self.map.insert(key.to_string(), value.serialize(self.child)?);
        Ok(())
    }

    fn end(self) -> Result<Value, StructureError> {
        Ok(Value::Object(self.map))
    }
}

struct StructVariantBuilder {
    variant: &'static str,
    map: MapBuilder,
}

impl ser::SerializeStructVariant for StructVariantBuilder {
    type Ok = Value;
    type Error = StructureError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), StructureError>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeStruct::serialize_field(&mut self.map, key, value)
    }

    fn end(self) -> Result<Value, StructureError> {
        let fields = ser::SerializeStruct::end(self.map)?;
        Ok(variant_object(self.variant, fields))
    }
}
