// Copyright 2024 Oxide Computer Company

//! Deserialize a map of strings (path variables, query parameters, request
//! headers) into a typed struct, parsing each value with `FromStr` according
//! to the type the struct asks for.

use paste::paste;
use serde::de::DeserializeSeed;
use serde::de::EnumAccess;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::VariantAccess;
use serde::de::Visitor;
use serde::Deserialize;
use serde::Deserializer;
use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt::Display;

/// How map keys are matched against struct field names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum KeyMatching {
    Exact,
    /// Keys match field names regardless of ASCII case.  Used for headers,
    /// whose names arrive lowercased.
    CaseInsensitive,
}

/// Deserializes `map` into `T`.  Errors carry the path of the offending
/// field.  Values are raw bytes, and are only required to be UTF-8 when a
/// field of `T` reads them.
pub(crate) fn from_map<'de, T, V>(
    map: &'de BTreeMap<String, V>,
    keys: KeyMatching,
) -> Result<T, serde_path_to_error::Error<MapError>>
where
    T: Deserialize<'de>,
    V: AsRef<[u8]>,
{
    let entries = map
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_ref()))
        .collect();
    let mut deserializer = MapDeserializer::Map { entries, keys };
    serde_path_to_error::deserialize(&mut deserializer)
}

/*
 * The deserializer has two modes: about to iterate over the map, or about to
 * interpret a single value.
 */
#[derive(Debug)]
enum MapDeserializer<'de> {
    Map { entries: Vec<(&'de str, &'de [u8])>, keys: KeyMatching },
    Value(&'de [u8]),
}

impl<'de> MapDeserializer<'de> {
    /*
     * Fail if we're expecting a map, or hand the raw value to `deserialize`.
     */
    fn value<VV, F>(&self, deserialize: F) -> Result<VV, MapError>
    where
        F: FnOnce(&'de str) -> Result<VV, MapError>,
    {
        match self {
            MapDeserializer::Value(raw_value) => {
                let raw_value = std::str::from_utf8(*raw_value).map_err(|_| {
                    MapError("value is not valid UTF-8".to_string())
                })?;
                deserialize(raw_value)
            }
            MapDeserializer::Map { .. } => Err(MapError(
                "must be applied to a flattened struct rather than a raw type"
                    .to_string(),
            )),
        }
    }

    fn entries(
        entries: &[(&'de str, &'de [u8])],
        keys: KeyMatching,
        fields: &'static [&'static str],
    ) -> Vec<(&'de str, &'de [u8])> {
        entries
            .iter()
            .map(|&(key, value)| {
                let key = match keys {
                    KeyMatching::Exact => key,
                    KeyMatching::CaseInsensitive => fields
                        .iter()
                        .find(|field| field.eq_ignore_ascii_case(key))
                        .copied()
                        .unwrap_or(key),
                };
                (key, value)
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MapError(pub String);

impl Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl serde::de::Error for MapError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        MapError(format!("{}", msg))
    }
}

impl std::error::Error for MapError {}

/*
 * Types that have no string form in a path or header.
 */
macro_rules! de_unsupported {
    ($i:ident $(, $p:ident : $t:ty )*) => {
        fn $i<V>(self $(, $p: $t)*, _visitor: V) -> Result<V::Value, MapError>
        where
            V: Visitor<'de>,
        {
            Err(MapError(format!(
                "unsupported destination type ({})",
                stringify!($i)
            )))
        }
    };
}

/*
 * Generate handlers for primitive types using FromStr::parse() on the string
 * form.
 */
macro_rules! de_value {
    ($i:ident) => {
        paste! {
            fn [<deserialize_ $i>]<V>(self, visitor: V)
                -> Result<V::Value, MapError>
            where
                V: Visitor<'de>,
            {
                self.value(|raw_value| match raw_value.parse::<$i>() {
                    Ok(value) => visitor.[<visit_ $i>](value),
                    Err(_) => Err(MapError(format!(
                        "unable to parse '{}' as {}",
                        raw_value,
                        type_name::<$i>()
                    ))),
                })
            }
        }
    };
}

impl<'de, 'a> Deserializer<'de> for &'a mut MapDeserializer<'de> {
    type Error = MapError;

    de_value!(bool);
    de_value!(i8);
    de_value!(i16);
    de_value!(i32);
    de_value!(i64);
    de_value!(u8);
    de_value!(u16);
    de_value!(u32);
    de_value!(u64);
    de_value!(f32);
    de_value!(f64);
    de_value!(char);

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value(|raw_value| visitor.visit_borrowed_str(raw_value))
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value(|raw_value| visitor.visit_borrowed_str(raw_value))
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        // A missing key never gets here.  An empty value is treated the same
        // way.
        if let MapDeserializer::Value(b"") = *self {
            return visitor.visit_none();
        }
        visitor.visit_some(self)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self {
            MapDeserializer::Map { entries, keys } => {
                let entries = MapDeserializer::entries(entries, *keys, fields);
                visitor.visit_map(MapMapAccess {
                    iter: entries.into_iter(),
                    value: None,
                })
            }
            MapDeserializer::Value(_) => Err(MapError(
                "destination struct must be fully flattened".to_string(),
            )),
        }
    }

    /*
     * Called directly for maps, and for structs containing a flattened struct
     * (serde cannot know the flattened struct's fields up front).
     */
    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self {
            MapDeserializer::Map { entries, keys } => {
                let entries = MapDeserializer::entries(entries, *keys, &[]);
                visitor.visit_map(MapMapAccess {
                    iter: entries.into_iter(),
                    value: None,
                })
            }
            MapDeserializer::Value(_) => Err(MapError(
                "destination struct must be fully flattened".to_string(),
            )),
        }
    }

    fn deserialize_identifier<V>(
        self,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value(|raw_value| visitor.visit_borrowed_str(raw_value))
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(self)
    }

    fn deserialize_ignored_any<V>(
        self,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    /*
     * Values of flattened structs come through here, and everything is a
     * string until a typed field asks for something else.
     */
    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        if let MapDeserializer::Value(_) = *self {
            return self
                .value(|raw_value| visitor.visit_borrowed_str(raw_value));
        }
        self.deserialize_map(visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    de_unsupported!(deserialize_bytes);
    de_unsupported!(deserialize_byte_buf);
    de_unsupported!(deserialize_unit);
    de_unsupported!(deserialize_unit_struct, _name: &'static str);
    de_unsupported!(deserialize_tuple, _len: usize);
    de_unsupported!(deserialize_tuple_struct, _name: &'static str, _len: usize);

    /*
     * Multiple values share one string, separated by commas.
     */
    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value(|raw_value| {
            let items: Vec<&'de str> = if raw_value.is_empty() {
                Vec::new()
            } else {
                raw_value.split(',').map(str::trim).collect()
            };
            visitor.visit_seq(MapSeqAccess { iter: items.into_iter() })
        })
    }
}

/*
 * Only unit variants have a string form.
 */
impl<'de, 'a> EnumAccess<'de> for &'a mut MapDeserializer<'de> {
    type Error = MapError;
    type Variant = Self;

    fn variant_seed<V>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), MapError>
    where
        V: DeserializeSeed<'de>,
    {
        seed.deserialize(&mut *self).map(|v| (v, self))
    }
}

impl<'de, 'a> VariantAccess<'de> for &'a mut MapDeserializer<'de> {
    type Error = MapError;

    fn unit_variant(self) -> Result<(), MapError> {
        Ok(())
    }

    fn newtype_variant_seed<T>(self, _seed: T) -> Result<T::Value, MapError>
    where
        T: DeserializeSeed<'de>,
    {
        Err(MapError("newtype variants are not supported".to_string()))
    }

    fn tuple_variant<V>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, MapError>
    where
        V: Visitor<'de>,
    {
        Err(MapError("tuple variants are not supported".to_string()))
    }

    fn struct_variant<V>(
        self,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, MapError>
    where
        V: Visitor<'de>,
    {
        Err(MapError("struct variants are not supported".to_string()))
    }
}

struct MapMapAccess<'de> {
    iter: std::vec::IntoIter<(&'de str, &'de [u8])>,
    /** Pending value in a key-value pair */
    value: Option<&'de [u8]>,
}

impl<'de> MapAccess<'de> for MapMapAccess<'de> {
    type Error = MapError;

    fn next_key_seed<K>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                let mut deserializer = MapDeserializer::Value(key.as_bytes());
                seed.deserialize(&mut deserializer).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        match self.value.take() {
            Some(value) => {
                let mut deserializer = MapDeserializer::Value(value);
                seed.deserialize(&mut deserializer)
            }
            None => Err(MapError("value requested before key".to_string())),
        }
    }
}

struct MapSeqAccess<'de> {
    iter: std::vec::IntoIter<&'de str>,
}

impl<'de> SeqAccess<'de> for MapSeqAccess<'de> {
    type Error = MapError;

    fn next_element_seed<T>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(value) => {
                let mut deserializer = MapDeserializer::Value(value.as_bytes());
                seed.deserialize(&mut deserializer).map(Some)
            }
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}
