use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Grant type reported when a token carries no `grant_type` claim
const UNKNOWN_GRANT_TYPE: &str = "unknown";

/// Seconds since the epoch. Fractional values are legal on the wire and are
/// kept as sent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericDate {
    Seconds(i64),
    Fractional(f64),
}

impl NumericDate {
    /// Whole seconds, rounded down
    pub fn timestamp(self) -> i64 {
        match self {
            Self::Seconds(secs) => secs,
            Self::Fractional(secs) => secs.floor() as i64,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value.as_i64() {
            Some(secs) => Some(Self::Seconds(secs)),
            None => value.as_f64().map(Self::Fractional),
        }
    }
}

/// Decoded payload of a verified token.
///
/// Deserialization never fails for a JSON object: a registered claim whose
/// value has an unexpected type (or is `null`) is left in `extra` under its
/// own name, so the claims still serialize back to the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Claims {
    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Short client id some issuers use instead of `client_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    /// Authorized party
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Granted scopes (array, or space-separated string on the wire)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,

    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (array, or a single string on the wire)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aud: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<NumericDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<NumericDate>,

    /// Tenant / zone identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,

    /// Every other payload member
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl From<Map<String, Value>> for Claims {
    fn from(mut payload: Map<String, Value>) -> Self {
        let mut string = |name: &str| take(&mut payload, name, |v| v.as_str().map(String::from));
        let sub = string("sub");
        let client_id = string("client_id");
        let cid = string("cid");
        let azp = string("azp");
        let iss = string("iss");
        let zid = string("zid");
        let user_id = string("user_id");
        let user_name = string("user_name");
        let email = string("email");
        let grant_type = string("grant_type");

        let scope = take(&mut payload, "scope", |v| match v {
            Value::String(scope) => Some(scope.split_whitespace().map(String::from).collect()),
            other => string_array(other),
        })
        .unwrap_or_default();
        let aud = take(&mut payload, "aud", |v| match v {
            Value::String(aud) => Some(vec![aud.clone()]),
            other => string_array(other),
        })
        .unwrap_or_default();
        let iat = take(&mut payload, "iat", NumericDate::from_value);
        let exp = take(&mut payload, "exp", NumericDate::from_value);

        Self {
            sub,
            client_id,
            cid,
            azp,
            scope,
            iss,
            aud,
            iat,
            exp,
            zid,
            user_id,
            user_name,
            email,
            grant_type,
            extra: payload.into_iter().collect(),
        }
    }
}

/// Remove `name` from `payload` if `convert` accepts its value.
fn take<T>(
    payload: &mut Map<String, Value>,
    name: &str,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let converted = convert(payload.get(name)?)?;
    payload.remove(name);
    Some(converted)
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(String::from))
        .collect()
}

impl Claims {
    /// `client_id`, then `cid`, then `azp`
    pub fn effective_client_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .or(self.cid.as_deref())
            .or(self.azp.as_deref())
    }
}

/// Request-scoped caller identity derived from verified [`Claims`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub grant_type: String,
}

impl From<&Claims> for Identity {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims
                .user_id
                .clone()
                .or_else(|| claims.sub.clone())
                .unwrap_or_default(),
            user_name: claims.user_name.clone(),
            email: claims.email.clone(),
            client_id: claims.effective_client_id().unwrap_or_default().to_string(),
            scopes: claims.scope.clone(),
            grant_type: claims
                .grant_type
                .clone()
                .unwrap_or_else(|| UNKNOWN_GRANT_TYPE.to_string()),
        }
    }
}

/// Anything carrying a granted scope set
pub trait Scoped {
    fn scopes(&self) -> &[String];
}

impl Scoped for Claims {
    fn scopes(&self) -> &[String] {
        &self.scope
    }
}

impl Scoped for Identity {
    fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claims_accept_string_or_array_forms() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "user-1",
            "aud": "sb-myapp",
            "scope": "myapp.read openid",
            "exp": 2000000000,
        }))
        .unwrap();

        assert_eq!(claims.aud, vec!["sb-myapp"]);
        assert_eq!(claims.scope, vec!["myapp.read", "openid"]);

        let claims: Claims = serde_json::from_value(json!({
            "sub": "user-1",
            "aud": ["a", "b"],
            "scope": ["myapp.read"],
            "exp": 2000000000,
        }))
        .unwrap();

        assert_eq!(claims.aud, vec!["a", "b"]);
        assert_eq!(claims.scope, vec!["myapp.read"]);
    }

    #[test]
    fn test_unknown_members_are_kept() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "user-1",
            "exp": 2000000000,
            "ext_attr": {"enhancer": "XSUAA"},
            "origin": "ldap",
        }))
        .unwrap();

        assert_eq!(claims.extra["origin"], json!("ldap"));
        assert_eq!(claims.extra["ext_attr"]["enhancer"], json!("XSUAA"));
        assert!(claims.scope.is_empty());
        assert!(claims.aud.is_empty());
    }

    #[test]
    fn test_identity_from_user_token() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "sub-1",
            "user_id": "user-1",
            "user_name": "jdoe",
            "email": "jdoe@example.com",
            "cid": "sb-myapp!t1",
            "scope": ["myapp.read"],
            "grant_type": "authorization_code",
            "exp": 2000000000,
        }))
        .unwrap();

        let identity = Identity::from(&claims);
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.user_name.as_deref(), Some("jdoe"));
        assert_eq!(identity.email.as_deref(), Some("jdoe@example.com"));
        assert_eq!(identity.client_id, "sb-myapp!t1");
        assert_eq!(identity.scopes, vec!["myapp.read"]);
        assert_eq!(identity.grant_type, "authorization_code");
    }

    #[test]
    fn test_identity_from_client_credentials_token() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "sb-myapp!t1",
            "azp": "sb-myapp!t1",
            "exp": 2000000000,
        }))
        .unwrap();

        let identity = Identity::from(&claims);
        assert_eq!(identity.user_id, "sb-myapp!t1");
        assert_eq!(identity.client_id, "sb-myapp!t1");
        assert_eq!(identity.grant_type, "unknown");
        assert!(identity.user_name.is_none());

        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["userId"], "sb-myapp!t1");
        assert_eq!(json["grantType"], "unknown");
        assert!(json.get("userName").is_none());
    }

    #[test]
    fn test_off_type_members_stay_in_extra() {
        let payload = json!({
            "sub": 42,
            "zid": null,
            "aud": ["a", 1],
            "scope": null,
            "iat": 1700000000.75,
            "exp": 1700000600,
        });
        let claims: Claims = serde_json::from_value(payload.clone()).unwrap();

        assert_eq!(claims.sub, None);
        assert_eq!(claims.zid, None);
        assert!(claims.aud.is_empty());
        assert!(claims.scope.is_empty());
        assert_eq!(claims.iat, Some(NumericDate::Fractional(1700000000.75)));
        assert_eq!(claims.iat.map(NumericDate::timestamp), Some(1700000000));
        assert_eq!(claims.exp, Some(NumericDate::Seconds(1700000600)));
        assert_eq!(claims.extra.len(), 4);
        assert_eq!(serde_json::to_value(&claims).unwrap(), payload);
    }
}
