//! Cognito user pools and Google federation.
//!
//! The identity layer is four constructs: a [`UserPool`], a
//! [`GoogleIdentityProvider`] registered with it, a hosted-UI
//! [`UserPoolDomain`] and a [`UserPoolClient`] the web frontend signs in
//! through. The client must not be created before the provider it lists,
//! which the topology expresses with a construct dependency.

use serde_json::{json, Map, Value as Json};

use super::secrets::Secret;
use super::{impl_construct, Duration, RemovalPolicy};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Value};

const VERIFICATION_MESSAGE: &str = "The verification code to your new account is {####}";
const VERIFICATION_SUBJECT: &str = "Verify your new account";

// ============================================================================
// User pool
// ============================================================================

/// Attributes Cognito verifies automatically on sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoVerifiedAttrs {
    /// Verify email addresses
    pub email: bool,
    /// Verify phone numbers
    pub phone: bool,
}

/// Properties for [`UserPool`].
#[derive(Debug, Clone, Default)]
pub struct UserPoolProps {
    /// Allow users to sign themselves up
    pub self_sign_up_enabled: bool,
    /// Automatically verified attributes
    pub auto_verify: AutoVerifiedAttrs,
    /// Removal policy
    pub removal_policy: RemovalPolicy,
}

/// A Cognito user pool.
#[derive(Debug, Clone)]
pub struct UserPool {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(UserPool);

impl UserPool {
    /// Declare a user pool.
    pub fn new(stack: &mut Stack, id: &str, props: UserPoolProps) -> Result<Self> {
        let mut auto_verified = Vec::new();
        if props.auto_verify.email {
            auto_verified.push("email");
        }
        if props.auto_verify.phone {
            auto_verified.push("phone_number");
        }

        let mut resource = Resource::new("AWS::Cognito::UserPool")
            .with_properties(json!({
                "AccountRecoverySetting": {
                    "RecoveryMechanisms": [
                        { "Name": "verified_phone_number", "Priority": 1 },
                        { "Name": "verified_email", "Priority": 2 }
                    ]
                },
                "AdminCreateUserConfig": {
                    "AllowAdminCreateUserOnly": !props.self_sign_up_enabled
                },
                "EmailVerificationMessage": VERIFICATION_MESSAGE,
                "EmailVerificationSubject": VERIFICATION_SUBJECT,
                "SmsVerificationMessage": VERIFICATION_MESSAGE,
                "VerificationMessageTemplate": {
                    "DefaultEmailOption": "CONFIRM_WITH_CODE",
                    "EmailMessage": VERIFICATION_MESSAGE,
                    "EmailSubject": VERIFICATION_SUBJECT,
                    "SmsMessage": VERIFICATION_MESSAGE
                }
            }))
            .with_removal_policy(props.removal_policy.deletion_policy());
        if !auto_verified.is_empty() {
            resource = resource.with_property("AutoVerifiedAttributes", json!(auto_verified));
        }

        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
        Ok(Self {
            path: vec![id.to_string()],
            logical_id,
        })
    }

    /// `Ref` (the user pool id)
    pub fn user_pool_id(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Fn::GetAtt Arn`
    pub fn arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }
}

// ============================================================================
// Google federation
// ============================================================================

/// A Google profile attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAttribute {
    /// `email`
    GoogleEmail,
    /// `name`
    GoogleName,
    /// `given_name`
    GoogleGivenName,
    /// `family_name`
    GoogleFamilyName,
    /// `picture`
    GooglePicture,
}

impl ProviderAttribute {
    /// Attribute name on the provider side
    pub fn attribute_name(self) -> &'static str {
        match self {
            ProviderAttribute::GoogleEmail => "email",
            ProviderAttribute::GoogleName => "name",
            ProviderAttribute::GoogleGivenName => "given_name",
            ProviderAttribute::GoogleFamilyName => "family_name",
            ProviderAttribute::GooglePicture => "picture",
        }
    }
}

/// Mapping from user pool standard attributes to provider attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMapping {
    /// `email`
    pub email: Option<ProviderAttribute>,
    /// `name`
    pub fullname: Option<ProviderAttribute>,
    /// `given_name`
    pub given_name: Option<ProviderAttribute>,
    /// `family_name`
    pub family_name: Option<ProviderAttribute>,
    /// `picture`
    pub profile_picture: Option<ProviderAttribute>,
}

impl AttributeMapping {
    fn to_json(&self) -> Json {
        let mut map = Map::new();
        let entries = [
            ("email", self.email),
            ("name", self.fullname),
            ("given_name", self.given_name),
            ("family_name", self.family_name),
            ("picture", self.profile_picture),
        ];
        for (standard, provider) in entries {
            if let Some(attr) = provider {
                map.insert(standard.to_string(), json!(attr.attribute_name()));
            }
        }
        Json::Object(map)
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Properties for [`GoogleIdentityProvider`].
#[derive(Debug, Clone)]
pub struct GoogleIdentityProviderProps {
    /// OAuth client id issued by Google
    pub client_id: String,
    /// Secret holding the OAuth client secret
    pub client_secret: Secret,
    /// Attribute mapping
    pub attribute_mapping: AttributeMapping,
    /// Extra scopes; `profile` is always requested
    pub scopes: Vec<String>,
}

/// Google registered as a federated identity provider of a user pool.
#[derive(Debug, Clone)]
pub struct GoogleIdentityProvider {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(GoogleIdentityProvider);

impl GoogleIdentityProvider {
    /// Provider name clients refer to.
    pub const PROVIDER_NAME: &'static str = "Google";

    /// Register Google with `user_pool`.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        user_pool: &UserPool,
        props: GoogleIdentityProviderProps,
    ) -> Result<Self> {
        if props.client_id.trim().is_empty() {
            return Err(Error::invalid_props(id, "Google client id is empty"));
        }

        let mut scopes = vec!["profile".to_string()];
        for scope in props.scopes {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        let mut resource = Resource::new("AWS::Cognito::UserPoolIdentityProvider").with_properties(
            json!({
                "ProviderDetails": {
                    "client_id": props.client_id,
                    "client_secret": props.client_secret.secret_value().to_json(),
                    "authorize_scopes": scopes.join(" ")
                },
                "ProviderName": Self::PROVIDER_NAME,
                "ProviderType": "Google",
                "UserPoolId": user_pool.user_pool_id().to_json()
            }),
        );
        if !props.attribute_mapping.is_empty() {
            resource = resource.with_property("AttributeMapping", props.attribute_mapping.to_json());
        }

        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
        Ok(Self {
            path: vec![id.to_string()],
            logical_id,
        })
    }

    /// `Ref` (the provider name)
    pub fn provider_name(&self) -> Value {
        Value::reference(&self.logical_id)
    }
}

// ============================================================================
// Hosted domain
// ============================================================================

/// A Cognito-hosted sign-in domain (`<prefix>.auth.<region>.amazoncognito.com`).
#[derive(Debug, Clone)]
pub struct UserPoolDomain {
    path: Vec<String>,
    logical_id: String,
    prefix: String,
}

impl_construct!(UserPoolDomain);

impl UserPoolDomain {
    /// Declare a Cognito domain with the given prefix.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        user_pool: &UserPool,
        domain_prefix: &str,
    ) -> Result<Self> {
        let valid = !domain_prefix.is_empty()
            && domain_prefix.len() <= 63
            && !domain_prefix.starts_with('-')
            && !domain_prefix.ends_with('-')
            && domain_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(Error::invalid_props(
                id,
                format!(
                    "domain prefix '{}' may only contain lowercase letters, digits and hyphens",
                    domain_prefix
                ),
            ));
        }
        if ["aws", "amazon", "cognito"]
            .iter()
            .any(|reserved| domain_prefix.contains(reserved))
        {
            return Err(Error::invalid_props(
                id,
                format!("domain prefix '{}' contains a reserved word", domain_prefix),
            ));
        }

        let resource = Resource::new("AWS::Cognito::UserPoolDomain").with_properties(json!({
            "Domain": domain_prefix,
            "UserPoolId": user_pool.user_pool_id().to_json()
        }));
        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;

        Ok(Self {
            path: vec![id.to_string()],
            logical_id,
            prefix: domain_prefix.to_string(),
        })
    }

    /// Domain prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `https://<prefix>.auth.<region>.amazoncognito.com`
    pub fn base_url(&self) -> Value {
        Value::join(
            "",
            vec![
                Value::from(format!("https://{}.auth.", self.prefix)),
                Value::region(),
                Value::from(".amazoncognito.com"),
            ],
        )
    }
}

// ============================================================================
// App client
// ============================================================================

/// Identity providers an app client may sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPoolClientIdentityProvider {
    /// The user pool's own directory
    Cognito,
    /// Google
    Google,
}

impl UserPoolClientIdentityProvider {
    fn as_str(self) -> &'static str {
        match self {
            UserPoolClientIdentityProvider::Cognito => "COGNITO",
            UserPoolClientIdentityProvider::Google => GoogleIdentityProvider::PROVIDER_NAME,
        }
    }
}

/// OAuth scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthScope {
    /// `email`
    Email,
    /// `openid`
    OpenId,
    /// `phone`
    Phone,
    /// `profile`
    Profile,
    /// `aws.cognito.signin.user.admin`
    CognitoAdmin,
}

impl OAuthScope {
    /// Scope string
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthScope::Email => "email",
            OAuthScope::OpenId => "openid",
            OAuthScope::Phone => "phone",
            OAuthScope::Profile => "profile",
            OAuthScope::CognitoAdmin => "aws.cognito.signin.user.admin",
        }
    }
}

/// OAuth grant flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OAuthFlows {
    /// Authorization code grant
    pub authorization_code_grant: bool,
    /// Implicit grant
    pub implicit_code_grant: bool,
}

impl Default for OAuthFlows {
    fn default() -> Self {
        Self {
            authorization_code_grant: true,
            implicit_code_grant: true,
        }
    }
}

/// OAuth configuration of an app client.
#[derive(Debug, Clone, Default)]
pub struct OAuthSettings {
    /// Enabled grant flows
    pub flows: OAuthFlows,
    /// Allowed redirect targets after sign-in
    pub callback_urls: Vec<String>,
    /// Requested scopes
    pub scopes: Vec<OAuthScope>,
}

/// Properties for [`UserPoolClient`].
#[derive(Debug, Clone, Default)]
pub struct UserPoolClientProps {
    /// Providers the client accepts
    pub supported_identity_providers: Vec<UserPoolClientIdentityProvider>,
    /// OAuth settings
    pub oauth: OAuthSettings,
    /// Access token lifetime, between 5 minutes and 1 day
    pub access_token_validity: Option<Duration>,
}

/// An app client of a user pool.
#[derive(Debug, Clone)]
pub struct UserPoolClient {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(UserPoolClient);

impl UserPoolClient {
    /// Declare an app client.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        user_pool: &UserPool,
        props: UserPoolClientProps,
    ) -> Result<Self> {
        let mut resource = Resource::new("AWS::Cognito::UserPoolClient")
            .with_property("UserPoolId", user_pool.user_pool_id().to_json());

        let mut flows = Vec::new();
        if props.oauth.flows.implicit_code_grant {
            flows.push("implicit");
        }
        if props.oauth.flows.authorization_code_grant {
            flows.push("code");
        }
        if !flows.is_empty() {
            if props.oauth.callback_urls.is_empty() {
                return Err(Error::invalid_props(
                    id,
                    "OAuth flows need at least one callback URL",
                ));
            }
            resource = resource
                .with_property("AllowedOAuthFlows", json!(flows))
                .with_property("AllowedOAuthFlowsUserPoolClient", json!(true));
        }

        for url in &props.oauth.callback_urls {
            let secure = url.starts_with("https://");
            let local = url.starts_with("http://localhost");
            if !secure && !local {
                return Err(Error::invalid_props(
                    id,
                    format!("callback URL '{}' must use https unless it is localhost", url),
                ));
            }
        }

        if !props.oauth.scopes.is_empty() {
            let scopes: Vec<&str> = props.oauth.scopes.iter().map(|s| s.as_str()).collect();
            resource = resource.with_property("AllowedOAuthScopes", json!(scopes));
        }
        if !props.oauth.callback_urls.is_empty() {
            resource = resource.with_property("CallbackURLs", json!(props.oauth.callback_urls));
        }
        if !props.supported_identity_providers.is_empty() {
            let providers: Vec<&str> = props
                .supported_identity_providers
                .iter()
                .map(|p| p.as_str())
                .collect();
            resource = resource.with_property("SupportedIdentityProviders", json!(providers));
        }

        if let Some(validity) = props.access_token_validity {
            if validity < Duration::minutes(5) || validity > Duration::days(1) {
                return Err(Error::invalid_props(
                    id,
                    "access token validity must be between 5 minutes and 1 day",
                ));
            }
            resource = resource
                .with_property("AccessTokenValidity", json!(validity.to_minutes()))
                .with_property("TokenValidityUnits", json!({ "AccessToken": "minutes" }));
        }

        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
        Ok(Self {
            path: vec![id.to_string()],
            logical_id,
        })
    }

    /// `Ref` (the client id)
    pub fn user_pool_client_id(&self) -> Value {
        Value::reference(&self.logical_id)
    }
}
