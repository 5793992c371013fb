//! Phone authentication session

use super::identity_handle::IdentityHandle;
use super::state::{AuthFailure, AuthState, SIGN_IN_FAILED, VERIFICATION_FAILED};
use crate::backend::{
    BackendError, DeliveryContext, FlagStore, PhoneAuthProvider, PhoneCredential,
    RealtimeDatabase, VerificationOutcome,
};
use crate::config::{AuthConfig, ClientConfig, ProfileConfig};
use crate::errors::{CoreError, CoreResult};
use crate::image_codec::{encode_profile_image, ProfileImage};
use crate::metrics::{
    AUTH_SIGN_IN_FAILED, AUTH_SIGN_IN_SUCCESS, AUTH_SIGN_OUT, AUTH_VERIFICATIONS_REQUESTED,
};
use crate::model::{Identity, VerificationChallenge};
use crate::schema;
use metrics::counter;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drives phone-number sign-in against the injected provider
///
/// Every operation returns the state it left the session in. Backend
/// errors never escape as `Err`; they become [`AuthState::Failed`] and the
/// caller decides whether to resubmit. `Err` is reserved for calls made
/// from a state that does not allow them.
pub struct AuthSession {
    auth: Arc<dyn PhoneAuthProvider>,
    db: Arc<dyn RealtimeDatabase>,
    flags: Arc<dyn FlagStore>,
    config: AuthConfig,
    profile: ProfileConfig,
    state: watch::Sender<AuthState>,
    identity: watch::Sender<Option<Identity>>,
    identity_reader: IdentityHandle,
    /// Survives a wrong code so the user can try again
    challenge: Mutex<Option<VerificationChallenge>>,
}

impl AuthSession {
    pub fn new(
        auth: Arc<dyn PhoneAuthProvider>,
        db: Arc<dyn RealtimeDatabase>,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        let (identity, identity_reader) = IdentityHandle::channel();
        Self {
            auth,
            db,
            flags,
            config: AuthConfig::default(),
            profile: ProfileConfig::default(),
            state: watch::channel(AuthState::Idle).0,
            identity,
            identity_reader,
            challenge: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.config = config.auth.clone();
        self.profile = config.profile.clone();
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Observe every state change
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Read-only identity view for the chat and messaging components
    pub fn identity(&self) -> IdentityHandle {
        self.identity_reader.clone()
    }

    /// Challenge a code can currently be submitted against
    pub fn challenge(&self) -> Option<VerificationChallenge> {
        self.lock_challenge().clone()
    }

    /// Durable "signed in" marker, checked at startup to skip registration
    pub fn is_signed_in(&self) -> bool {
        self.flags.get_flag(&self.config.signed_in_flag)
    }

    /// Start verification of `phone_number`
    ///
    /// Allowed from `Idle`, `Failed` and `ChallengeIssued`. Resolves to
    /// `ChallengeIssued`, `Authenticated` (instant verification) or `Failed`.
    /// A new submission discards any earlier challenge.
    pub async fn submit_phone_number(
        &self,
        phone_number: &str,
        context: &DeliveryContext,
    ) -> CoreResult<AuthState> {
        const OPERATION: &str = "submit phone number";
        let can_submit =
            |s: &AuthState| matches!(s, AuthState::Idle | AuthState::Failed(_) | AuthState::ChallengeIssued(_));

        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            let failed = AuthState::Failed(AuthFailure::new(
                "Phone number required",
                CoreError::PreconditionFailed("phone number is empty".to_string()),
            ));
            self.enter(OPERATION, can_submit, failed.clone())?;
            return Ok(failed);
        }

        self.enter(OPERATION, can_submit, AuthState::Submitting)?;
        let _busy = BusyGuard::new(&self.state);
        self.replace_challenge(None);

        counter!(AUTH_VERIFICATIONS_REQUESTED).increment(1);
        info!(phone_number, channel = ?context.channel, "Requesting phone verification");

        let outcome = self
            .auth
            .begin_phone_verification(phone_number, context, self.config.verification_timeout)
            .await;

        match outcome {
            Ok(VerificationOutcome::CodeSent { verification_id }) => {
                debug!(verification_id = %verification_id, "Code sent");
                let challenge = VerificationChallenge::new(verification_id, phone_number);
                self.replace_challenge(Some(challenge.clone()));
                Ok(self.publish(AuthState::ChallengeIssued(challenge)))
            }
            Ok(VerificationOutcome::Instant(credential)) => {
                debug!(phone_number, "Number verified without a code");
                self.publish(AuthState::Verifying);
                Ok(self.verify_credential(credential).await)
            }
            Err(e) => {
                warn!(phone_number, error = %e, "Phone verification failed");
                Ok(self.publish(AuthState::Failed(AuthFailure::new(
                    VERIFICATION_FAILED,
                    e.into(),
                ))))
            }
        }
    }

    /// Pair `code` with the live challenge and sign in
    ///
    /// With no live challenge, or an empty code, the session fails with
    /// "verification not started" and the provider is not contacted.
    pub async fn submit_code(&self, code: &str) -> CoreResult<AuthState> {
        let code = code.trim();
        let challenge = self.challenge().filter(|_| !code.is_empty());

        let next = match challenge {
            Some(_) => AuthState::Verifying,
            None => AuthState::Failed(AuthFailure::not_started()),
        };
        self.enter(
            "submit code",
            |s| !s.is_busy() && !matches!(s, AuthState::Authenticated(_)),
            next.clone(),
        )?;

        let Some(challenge) = challenge else {
            warn!("Code submitted without a live challenge");
            return Ok(next);
        };
        let _busy = BusyGuard::new(&self.state);

        let credential = self
            .auth
            .credential_from_verification(&challenge.verification_id, code);
        Ok(self.verify_credential(credential).await)
    }

    /// Sign in with `credential`, then load any stored profile
    async fn verify_credential(&self, credential: PhoneCredential) -> AuthState {
        let user = match self.auth.sign_in(credential).await {
            Ok(user) => user,
            Err(e) => {
                counter!(AUTH_SIGN_IN_FAILED).increment(1);
                // A mistyped code can be retried against the same challenge
                if e != BackendError::InvalidCode {
                    self.replace_challenge(None);
                }
                warn!(error = %e, "Sign-in failed");
                return self.publish(AuthState::Failed(AuthFailure::new(SIGN_IN_FAILED, e.into())));
            }
        };
        self.replace_challenge(None);

        let mut identity = Identity::from_authenticated(&user);
        self.identity.send_replace(Some(identity.clone()));

        if let Err(e) = self.flags.set_flag(&self.config.signed_in_flag, true) {
            warn!(error = %e, "Could not persist signed-in flag");
        }

        match self.fetch_profile(&user.user_id).await {
            Ok(Some(stored)) => {
                identity = identity.merge_profile(stored);
                self.identity.send_replace(Some(identity.clone()));
            }
            Ok(None) => debug!(user_id = %user.user_id, "No stored profile"),
            Err(e) => warn!(user_id = %user.user_id, error = %e, "Profile lookup failed"),
        }

        counter!(AUTH_SIGN_IN_SUCCESS).increment(1);
        info!(user_id = %identity.user_id, "Signed in");
        self.publish(AuthState::Authenticated(identity))
    }

    async fn fetch_profile(&self, user_id: &str) -> CoreResult<Option<Identity>> {
        let snapshot = self.db.read(&schema::user(user_id)).await?;
        Ok(snapshot.get::<Identity>()?)
    }

    /// Write the full profile record of `user_id`
    ///
    /// The stored record is replaced as a whole: without `image` any
    /// previously stored picture is dropped. The phone number comes from the
    /// provider's current session.
    pub async fn save_profile(
        &self,
        user_id: &str,
        name: &str,
        status: &str,
        image: Option<&ProfileImage>,
    ) -> CoreResult<Identity> {
        if user_id.trim().is_empty() {
            return Err(CoreError::PreconditionFailed("user id is empty".to_string()));
        }

        let profile_image = image
            .map(|image| encode_profile_image(image, self.profile.jpeg_quality))
            .transpose()?;

        let identity = Identity {
            user_id: user_id.to_string(),
            phone_number: self
                .auth
                .current_user()
                .map(|user| user.phone_number)
                .unwrap_or_default(),
            name: name.to_string(),
            status: status.to_string(),
            profile_image,
        };

        self.db
            .write(&schema::user(user_id), serde_json::to_value(&identity)?)
            .await?;

        self.identity.send_if_modified(|current| match current {
            Some(current) if current.user_id == identity.user_id => {
                *current = identity.clone();
                true
            }
            _ => false,
        });
        self.state.send_if_modified(|state| match state {
            AuthState::Authenticated(current) if current.user_id == identity.user_id => {
                *current = identity.clone();
                true
            }
            _ => false,
        });

        info!(user_id, with_image = identity.profile_image.is_some(), "Profile saved");
        Ok(identity)
    }

    /// End the provider session and clear the local identity
    ///
    /// The stored profile is left in place.
    pub async fn sign_out(&self) -> CoreResult<()> {
        let current = self.state();
        if current.is_busy() {
            return Err(CoreError::InvalidTransition {
                operation: "sign out",
                state: current.name(),
            });
        }

        self.auth.sign_out().await?;
        self.flags.set_flag(&self.config.signed_in_flag, false)?;

        self.identity.send_replace(None);
        self.replace_challenge(None);
        self.publish(AuthState::Idle);

        counter!(AUTH_SIGN_OUT).increment(1);
        info!("Signed out");
        Ok(())
    }

    /// Return to `Idle`
    ///
    /// The signed-in identity, if any, is kept.
    pub fn reset(&self) -> CoreResult<AuthState> {
        self.enter("reset", |s| !s.is_busy(), AuthState::Idle)?;
        self.replace_challenge(None);
        Ok(AuthState::Idle)
    }

    /// Move to `next` if `allowed` accepts the current state
    fn enter(
        &self,
        operation: &'static str,
        allowed: impl FnOnce(&AuthState) -> bool,
        next: AuthState,
    ) -> CoreResult<()> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if allowed(state) {
                *state = next;
                true
            } else {
                rejected = Some(state.name());
                false
            }
        });

        match rejected {
            Some(state) => {
                debug!(operation, state, "Rejected transition");
                Err(CoreError::InvalidTransition { operation, state })
            }
            None => Ok(()),
        }
    }

    fn publish(&self, state: AuthState) -> AuthState {
        debug!(state = state.name(), "Auth state changed");
        self.state.send_replace(state.clone());
        state
    }

    fn lock_challenge(&self) -> std::sync::MutexGuard<'_, Option<VerificationChallenge>> {
        self.challenge
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replace_challenge(&self, challenge: Option<VerificationChallenge>) {
        *self.lock_challenge() = challenge;
    }
}

/// Fails the session if the operation that made it busy is dropped before
/// the provider answers
struct BusyGuard<'a> {
    state: &'a watch::Sender<AuthState>,
}

impl<'a> BusyGuard<'a> {
    fn new(state: &'a watch::Sender<AuthState>) -> Self {
        Self { state }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            let message = match state {
                AuthState::Submitting => VERIFICATION_FAILED,
                AuthState::Verifying => SIGN_IN_FAILED,
                _ => return false,
            };
            warn!(state = state.name(), "Auth operation abandoned while waiting on the provider");
            *state = AuthState::Failed(AuthFailure::new(
                message,
                CoreError::BackendUnavailable("operation abandoned".to_string()),
            ));
            true
        });
    }
}
