use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::{
    de::{
        value::MapDeserializer, DeserializeOwned, Error as _, IntoDeserializer, Unexpected,
        Visitor,
    },
    forward_to_deserialize_any, Deserializer,
};
use serde_json::{Map, Value};
use tracing::error;

use crate::{error::AppError, storage::UploadedFile};

/// Request body for endpoints that take either plain JSON or a multipart form carrying files.
///
/// In a multipart body the `data` part holds the JSON fields. Any other text part is kept as
/// text and converted to the type of the field it is decoded into, so `department=3` fills an
/// integer field and `is_active=true` a boolean one. Parts with a filename become
/// [`UploadedFile`]s keyed by part name.
#[derive(Debug, Default)]
pub struct FormPayload {
    pub data: Value,
    pub text: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl FormPayload {
    pub fn from_json(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        let decoded = if self.text.is_empty() {
            serde_json::from_value(self.data.clone())
        } else {
            let mut fields: HashMap<String, FormField> = self
                .text
                .iter()
                .map(|(name, text)| (name.clone(), FormField::Text(text.clone())))
                .collect();
            if let Value::Object(object) = &self.data {
                for (name, value) in object {
                    fields.insert(name.clone(), FormField::Json(value.clone()));
                }
            }
            T::deserialize(MapDeserializer::<_, serde_json::Error>::new(fields.into_iter()))
        };
        decoded.map_err(|err| AppError::bad_request(format!("invalid payload: {err}")))
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

/// One decoded form field: a value from the JSON `data` part, or a plain text part.
enum FormField {
    Json(Value),
    Text(String),
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for FormField {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! dispatch_field {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                match self {
                    FormField::Json(value) => value.$method(visitor),
                    FormField::Text(text) => FormText(text).$method(visitor),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for FormField {
    type Error = serde_json::Error;

    dispatch_field! {
        deserialize_any deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32
        deserialize_i64 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf deserialize_option deserialize_unit
        deserialize_seq deserialize_map deserialize_identifier deserialize_ignored_any
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self {
            FormField::Json(value) => value.deserialize_unit_struct(name, visitor),
            FormField::Text(text) => FormText(text).deserialize_unit_struct(name, visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self {
            FormField::Json(value) => value.deserialize_newtype_struct(name, visitor),
            FormField::Text(text) => FormText(text).deserialize_newtype_struct(name, visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self {
            FormField::Json(value) => value.deserialize_tuple(len, visitor),
            FormField::Text(text) => FormText(text).deserialize_tuple(len, visitor),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self {
            FormField::Json(value) => value.deserialize_tuple_struct(name, len, visitor),
            FormField::Text(text) => FormText(text).deserialize_tuple_struct(name, len, visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self {
            FormField::Json(value) => value.deserialize_struct(name, fields, visitor),
            FormField::Text(text) => FormText(text).deserialize_struct(name, fields, visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self {
            FormField::Json(value) => value.deserialize_enum(name, variants, visitor),
            FormField::Text(text) => FormText(text).deserialize_enum(name, variants, visitor),
        }
    }
}

/// A text form part, parsed into whatever type the target field asks for.
struct FormText(String);

macro_rules! parse_text {
    ($($method:ident => $ty:ty, $visit:ident;)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let parsed = self.0.trim().parse::<$ty>().map_err(|_| {
                    serde_json::Error::invalid_value(Unexpected::Str(&self.0), &stringify!($ty))
                })?;
                visitor.$visit(parsed)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for FormText {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.0)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0.trim() {
            "true" | "1" | "on" => visitor.visit_bool(true),
            "false" | "0" | "off" => visitor.visit_bool(false),
            other => Err(serde_json::Error::invalid_value(
                Unexpected::Str(other),
                &"a boolean",
            )),
        }
    }

    parse_text! {
        deserialize_i8 => i8, visit_i8;
        deserialize_i16 => i16, visit_i16;
        deserialize_i32 => i32, visit_i32;
        deserialize_i64 => i64, visit_i64;
        deserialize_u8 => u8, visit_u8;
        deserialize_u16 => u16, visit_u16;
        deserialize_u32 => u32, visit_u32;
        deserialize_u64 => u64, visit_u64;
        deserialize_f32 => f32, visit_f32;
        deserialize_f64 => f64, visit_f64;
    }

    /// An empty part or the literal `null` clears a nullable field.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.0.is_empty() || self.0 == "null" {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_enum(IntoDeserializer::<'de, serde_json::Error>::into_deserializer(self.0))
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        char str string bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(format!("invalid multipart data: {err}")))?;
            read_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(data) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(format!("invalid JSON body: {err}")))?;
            Ok(Self::from_json(data))
        } else {
            Err(AppError::bad_request(
                "expected an application/json or multipart/form-data body",
            ))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<FormPayload, AppError> {
    let mut fields = Map::new();
    let mut text = HashMap::new();
    let mut files = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|err| {
                error!(error = %err, field = %name, "failed to read file bytes");
                AppError::bad_request(format!("failed to read {name}: {err}"))
            })?;
            files.insert(
                name,
                UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                },
            );
            continue;
        }

        let value = field.text().await.map_err(|err| {
            error!(error = %err, field = %name, "failed to read form field");
            AppError::bad_request(format!("invalid {name}: {err}"))
        })?;

        if name == "data" {
            let parsed: Value = serde_json::from_str(&value)
                .map_err(|err| AppError::bad_request(format!("data must be valid JSON: {err}")))?;
            let Value::Object(object) = parsed else {
                return Err(AppError::bad_request("data must be a JSON object"));
            };
            fields.extend(object);
        } else {
            text.insert(name, value);
        }
    }

    Ok(FormPayload {
        data: Value::Object(fields),
        text,
        files,
    })
}
