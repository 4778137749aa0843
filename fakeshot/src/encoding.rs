// Copyright 2024 Oxide Computer Company

//! Parameter types with a specific text encoding
//!
//! These types serialize to and from strings, so they can be used as fields
//! of path, query and header parameter structs as well as in JSON bodies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use chrono::Utc;
use serde::de::Visitor;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Error produced when parsing one of the types in this module.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid {kind}: {message}")]
pub struct EncodingError {
    kind: &'static str,
    message: String,
}

/// A timestamp in the RFC 1123 format used by HTTP headers, such as
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HttpDate(pub DateTime<Utc>);

impl HttpDate {
    const FORMAT: &'static str = "%a, %d %b %Y %H:%M:%S GMT";
}

impl fmt::Display for HttpDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for HttpDate {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |message: String| EncodingError {
            kind: "HTTP date",
            message: format!("{:?}: {}", s, message),
        };
        let date = NaiveDateTime::parse_from_str(s, Self::FORMAT)
            .map(|date| HttpDate(Utc.from_utc_datetime(&date)))
            .map_err(|e| error(e.to_string()))?;
        /*
         * chrono also accepts short years, unpadded days and full weekday
         * names.  Only the canonical form is valid.
         */
        if date.to_string() != s {
            return Err(error("not in RFC 1123 form".to_string()));
        }
        Ok(date)
    }
}

impl From<DateTime<Utc>> for HttpDate {
    fn from(date: DateTime<Utc>) -> Self {
        HttpDate(date)
    }
}

/// Bytes encoded as standard (padded) base64.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Base64Bytes(pub Vec<u8>);

impl fmt::Display for Base64Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(&self.0))
    }
}

impl FromStr for Base64Bytes {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STANDARD.decode(s).map(Base64Bytes).map_err(|e| EncodingError {
            kind: "base64",
            message: e.to_string(),
        })
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Base64Bytes(bytes)
    }
}

/// A comma-separated list, such as `a,b,c`.  An empty string is an empty
/// list.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Delimited<T>(pub Vec<T>);

impl<T: fmt::Display> fmt::Display for Delimited<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl<T> FromStr for Delimited<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Delimited(Vec::new()));
        }
        s.split(',')
            .map(|item| {
                item.trim().parse::<T>().map_err(|e| EncodingError {
                    kind: "list item",
                    message: format!("{:?}: {}", item, e),
                })
            })
            .collect::<Result<Vec<T>, _>>()
            .map(Delimited)
    }
}

/// Deserializes any `FromStr` type from a string.
struct FromStrVisitor<T>(PhantomData<T>);

impl<'de, T> Visitor<'de> for FromStrVisitor<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<T, E> {
        v.parse().map_err(E::custom)
    }
}

macro_rules! impl_string_serde {
    ($t:ident $(<$p:ident>)?) => {
        impl$(<$p>)? Serialize for $t$(<$p>)?
        where
            Self: fmt::Display,
        {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de, $($p)?> Deserialize<'de> for $t$(<$p>)?
        where
            Self: FromStr,
            <Self as FromStr>::Err: fmt::Display,
        {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                deserializer.deserialize_str(FromStrVisitor(PhantomData))
            }
        }
    };
}

impl_string_serde!(HttpDate);
impl_string_serde!(Base64Bytes);
impl_string_serde!(Delimited<T>);
