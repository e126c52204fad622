//! Set and generate requests.
//!
//! Both request shapes are keyed by a `"type"` field. Parsing reads the name
//! and the type first, then decodes the rest into the matching value or
//! parameter struct, so a malformed body fails with the reason for its type.

use std::str::FromStr;

use credvault_core::{
    normalize_name, validate_name, CredentialType, CredentialValue, GenerationParameters,
    PasswordParameters, RsaParameters, SshParameters, UserParameters, ValidationError,
};
use credvault_pki::{validate_request, CertificateGenerationRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How `generate` treats an existing credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Always mint a new version.
    Overwrite,
    /// Keep any existing version.
    NoOverwrite,
    /// Mint only when the existing version was generated differently.
    #[default]
    Converge,
}

impl FromStr for WriteMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "no-overwrite" => Ok(WriteMode::NoOverwrite),
            "converge" => Ok(WriteMode::Converge),
            _ => Err(ValidationError::with_detail("error.invalid_mode", s)),
        }
    }
}

/// Store a caller-supplied value.
#[derive(Debug, Clone)]
pub struct SetRequest {
    pub name: String,
    pub value: CredentialValue,
}

impl SetRequest {
    pub fn new(name: &str, value: CredentialValue) -> Result<Self, ValidationError> {
        value.validate()?;
        Ok(Self {
            name: validate_name(name)?,
            value,
        })
    }

    /// Decode `{"name", "type", "value"}`.
    pub fn from_json_value(body: Value) -> Result<Self, ValidationError> {
        let mut body = into_object(body)?;
        let name = take_name(&mut body)?;
        let credential_type = take_type(&mut body)?;
        let value = body
            .remove("value")
            .filter(|v| !v.is_null())
            .ok_or_else(|| ValidationError::new("error.missing_value"))?;

        Ok(Self {
            name,
            value: CredentialValue::from_json(credential_type, value)?,
        })
    }
}

impl FromStr for SetRequest {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json_value(parse_body(s)?)
    }
}

/// Generate a value.
///
/// `parameters` is `None` when the caller expressed no opinion; in converge
/// mode an existing version then always matches.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub name: String,
    pub credential_type: CredentialType,
    pub mode: WriteMode,
    pub parameters: Option<GenerationParameters>,
}

impl GenerateRequest {
    /// A request with explicit parameters.
    pub fn new(
        name: &str,
        parameters: GenerationParameters,
        mode: WriteMode,
    ) -> Result<Self, ValidationError> {
        parameters.validate()?;
        Ok(Self {
            name: validate_name(name)?,
            credential_type: parameters.credential_type(),
            mode,
            parameters: Some(normalize_ca_name(parameters)),
        })
    }

    /// A request with no parameters.
    pub fn without_parameters(
        name: &str,
        credential_type: CredentialType,
        mode: WriteMode,
    ) -> Result<Self, ValidationError> {
        if !credential_type.is_generatable() {
            return Err(ValidationError::with_detail(
                "error.invalid_type",
                credential_type,
            ));
        }
        Ok(Self {
            name: validate_name(name)?,
            credential_type,
            mode,
            parameters: None,
        })
    }

    /// Decode `{"name", "type", "mode" | "overwrite", "parameters", "value"}`.
    ///
    /// `overwrite: true` is the older spelling of `mode: "overwrite"`; giving
    /// both is an error. A user request may carry its username either in
    /// `parameters` or in `value`.
    pub fn from_json_value(body: Value) -> Result<Self, ValidationError> {
        let mut body = into_object(body)?;
        let name = take_name(&mut body)?;
        let credential_type = take_type(&mut body)?;
        if !credential_type.is_generatable() {
            return Err(ValidationError::with_detail(
                "error.invalid_type",
                credential_type,
            ));
        }

        let mode = match (body.remove("mode"), body.remove("overwrite")) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::new(
                    "error.overwrite_and_mode_both_provided",
                ))
            }
            (Some(Value::String(mode)), None) => mode.parse()?,
            (Some(other), None) => {
                return Err(ValidationError::with_detail("error.invalid_mode", other))
            }
            (None, Some(Value::Bool(true))) => WriteMode::Overwrite,
            (None, Some(Value::Bool(false))) => WriteMode::NoOverwrite,
            (None, Some(other)) => {
                return Err(ValidationError::with_detail("error.bad_request", other))
            }
            (None, None) => WriteMode::default(),
        };

        let raw = body.remove("parameters").filter(|v| !v.is_null());
        let value = body.remove("value").filter(|v| !v.is_null());
        let parameters = match credential_type {
            CredentialType::Password => raw
                .map(|p| decode::<PasswordParameters>(p).map(GenerationParameters::Password))
                .transpose()?,
            CredentialType::Ssh => raw
                .map(|p| decode::<SshParameters>(p).map(GenerationParameters::Ssh))
                .transpose()?,
            CredentialType::Rsa => raw
                .map(|p| decode::<RsaParameters>(p).map(GenerationParameters::Rsa))
                .transpose()?,
            CredentialType::User => user_parameters(raw, value)?,
            CredentialType::Certificate => raw
                .map(|p| {
                    let request = decode::<CertificateGenerationRequest>(p)?;
                    let params = validate_request(&request).map_err(ValidationError::from)?;
                    Ok::<_, ValidationError>(GenerationParameters::Certificate(params))
                })
                .transpose()?,
            CredentialType::Value | CredentialType::Json => None,
        };

        if let Some(parameters) = &parameters {
            parameters.validate()?;
        }

        Ok(Self {
            name,
            credential_type,
            mode,
            parameters: parameters.map(normalize_ca_name),
        })
    }
}

impl FromStr for GenerateRequest {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json_value(parse_body(s)?)
    }
}

fn user_parameters(
    raw: Option<Value>,
    value: Option<Value>,
) -> Result<Option<GenerationParameters>, ValidationError> {
    #[derive(Deserialize)]
    struct UserValueBody {
        username: Option<String>,
    }

    let username = value
        .map(decode::<UserValueBody>)
        .transpose()?
        .and_then(|v| v.username);

    let params = match (raw, username) {
        (None, None) => return Ok(None),
        (Some(raw), username) => {
            let mut params = decode::<UserParameters>(raw)?;
            if username.is_some() {
                params.username = username;
            }
            params
        }
        (None, username) => UserParameters {
            username,
            ..Default::default()
        },
    };
    Ok(Some(GenerationParameters::User(params)))
}

/// Certificate versions store their CA by canonical name.
fn normalize_ca_name(parameters: GenerationParameters) -> GenerationParameters {
    match parameters {
        GenerationParameters::Certificate(mut params) => {
            params.ca_name = params.ca_name.map(|ca| normalize_name(&ca));
            GenerationParameters::Certificate(params)
        }
        other => other,
    }
}

fn parse_body(s: &str) -> Result<Value, ValidationError> {
    serde_json::from_str(s).map_err(|e| ValidationError::with_detail("error.bad_request", e))
}

fn into_object(body: Value) -> Result<Map<String, Value>, ValidationError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::new("error.bad_request")),
    }
}

fn take_name(body: &mut Map<String, Value>) -> Result<String, ValidationError> {
    match body.remove("name") {
        Some(Value::String(name)) => validate_name(&name),
        _ => Err(ValidationError::new("error.missing_name")),
    }
}

fn take_type(body: &mut Map<String, Value>) -> Result<CredentialType, ValidationError> {
    match body.remove("type") {
        Some(Value::String(t)) => t
            .parse()
            .map_err(|_| ValidationError::with_detail("error.invalid_type", t)),
        _ => Err(ValidationError::new("error.invalid_type")),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::with_detail("error.bad_request", e))
}
