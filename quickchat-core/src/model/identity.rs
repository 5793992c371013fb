//! Signed-in user identity and verification challenge

use super::types::Timestamp;
use crate::backend::AuthenticatedUser;
use serde::{Deserialize, Serialize};

/// Profile record of a user, stored under `users/{userId}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub user_id: String,
    pub phone_number: String,
    pub name: String,
    pub status: String,
    /// Base64 JPEG, see [`crate::image_codec`]
    pub profile_image: Option<String>,
}

impl Identity {
    /// Bare identity right after sign-in, before any profile lookup
    pub fn from_authenticated(user: &AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            phone_number: user.phone_number.clone(),
            ..Default::default()
        }
    }

    /// Overlay a previously stored profile onto this identity
    ///
    /// Ids and phone number coming from the auth provider win when the stored
    /// record leaves them blank.
    pub fn merge_profile(self, stored: Identity) -> Self {
        Self {
            user_id: if stored.user_id.is_empty() {
                self.user_id
            } else {
                stored.user_id
            },
            phone_number: if stored.phone_number.is_empty() {
                self.phone_number
            } else {
                stored.phone_number
            },
            name: stored.name,
            status: stored.status,
            profile_image: stored.profile_image,
        }
    }

    /// Whether the profile-setup step has been completed
    pub fn has_profile(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Opaque challenge issued by the verification provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationChallenge {
    pub verification_id: String,
    pub phone_number: String,
    pub issued_at: Timestamp,
}

impl VerificationChallenge {
    pub fn new(verification_id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            verification_id: verification_id.into(),
            phone_number: phone_number.into(),
            issued_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_field_names() {
        let identity = Identity {
            user_id: "uid-1".into(),
            phone_number: "+15551234567".into(),
            name: "Alice".into(),
            status: "Hey there".into(),
            profile_image: None,
        };
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["userId"], "uid-1");
        assert_eq!(value["phoneNumber"], "+15551234567");
        assert!(value["profileImage"].is_null());
    }

    #[test]
    fn test_partial_record_decodes() {
        let identity: Identity = serde_json::from_value(json!({ "name": "Bob" })).unwrap();
        assert_eq!(identity.name, "Bob");
        assert!(identity.user_id.is_empty());
        assert!(identity.has_profile());
    }

    #[test]
    fn test_merge_keeps_provider_ids_when_blank() {
        let bare = Identity::from_authenticated(&AuthenticatedUser {
            user_id: "uid-1".into(),
            phone_number: "+15551234567".into(),
        });
        let stored = Identity {
            name: "Alice".into(),
            status: "Busy".into(),
            profile_image: Some("aGk=".into()),
            ..Default::default()
        };

        let merged = bare.merge_profile(stored);
        assert_eq!(merged.user_id, "uid-1");
        assert_eq!(merged.phone_number, "+15551234567");
        assert_eq!(merged.name, "Alice");
        assert_eq!(merged.profile_image.as_deref(), Some("aGk="));
    }
}
