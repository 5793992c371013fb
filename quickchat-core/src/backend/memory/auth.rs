//! In-memory phone verification provider

use crate::backend::{
    AuthenticatedUser, BackendError, BackendResult, DeliveryContext, PhoneAuthProvider,
    PhoneCredential, VerificationOutcome,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    /// phone number -> expected one-time code
    codes: HashMap<String, String>,
    /// numbers verified without user input
    instant: HashSet<String>,
    /// numbers the provider refuses
    rejected: HashMap<String, BackendError>,
    /// queued verification ids, handed out before random ones
    next_ids: VecDeque<String>,
    /// live verification id -> phone number
    challenges: HashMap<String, String>,
    /// issued instant tokens -> phone number
    instant_tokens: HashMap<String, String>,
    /// phone number -> stable user id
    users: HashMap<String, String>,
    /// failure returned by the next `sign_in`, if set
    next_sign_in_failure: Option<BackendError>,
    current: Option<AuthenticatedUser>,
}

/// Scriptable [`PhoneAuthProvider`]
///
/// # Example
///
/// ```
/// use quickchat_core::backend::memory::MemoryPhoneAuth;
///
/// let auth = MemoryPhoneAuth::new()
///     .with_code("+15551234567", "123456")
///     .with_next_verification_id("abc");
/// assert_eq!(auth.verification_requests(), 0);
/// ```
pub struct MemoryPhoneAuth {
    inner: Mutex<Inner>,
    verification_requests: AtomicUsize,
    sign_in_attempts: AtomicUsize,
}

impl MemoryPhoneAuth {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            verification_requests: AtomicUsize::new(0),
            sign_in_attempts: AtomicUsize::new(0),
        }
    }

    /// Accept `code` for `phone_number`
    pub fn with_code(self, phone_number: &str, code: &str) -> Self {
        self.update(|inner| {
            inner.codes.insert(phone_number.to_string(), code.to_string());
        });
        self
    }

    /// Complete verification of `phone_number` immediately
    pub fn with_instant_verification(self, phone_number: &str) -> Self {
        self.update(|inner| {
            inner.instant.insert(phone_number.to_string());
        });
        self
    }

    /// Refuse `phone_number` with `error`
    pub fn with_rejection(self, phone_number: &str, error: BackendError) -> Self {
        self.update(|inner| {
            inner.rejected.insert(phone_number.to_string(), error);
        });
        self
    }

    /// Use `id` for the next challenge instead of a random one
    pub fn with_next_verification_id(self, id: &str) -> Self {
        self.update(|inner| inner.next_ids.push_back(id.to_string()));
        self
    }

    /// Pin the user id assigned to `phone_number`
    pub fn with_user_id(self, phone_number: &str, user_id: &str) -> Self {
        self.update(|inner| {
            inner
                .users
                .insert(phone_number.to_string(), user_id.to_string());
        });
        self
    }

    /// Make the next `sign_in` fail with `error`, whatever the credential
    pub fn fail_next_sign_in(&self, error: BackendError) {
        self.update(|inner| inner.next_sign_in_failure = Some(error));
    }

    /// How many times `begin_phone_verification` was called
    pub fn verification_requests(&self) -> usize {
        self.verification_requests.load(Ordering::SeqCst)
    }

    /// How many times `sign_in` was called
    pub fn sign_in_attempts(&self) -> usize {
        self.sign_in_attempts.load(Ordering::SeqCst)
    }

    /// Number of challenges the provider still accepts
    pub fn live_challenges(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.challenges.len())
            .unwrap_or(0)
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) {
        if let Ok(mut inner) = self.inner.lock() {
            f(&mut inner);
        }
    }

    fn lock(&self) -> BackendResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Unavailable("auth provider lock poisoned".to_string()))
    }
}

impl Default for MemoryPhoneAuth {
    fn default() -> Self {
        Self::new()
    }
}

/// E.164: leading `+`, then 8 to 15 digits
fn is_valid_e164(number: &str) -> bool {
    match number.strip_prefix('+') {
        Some(digits) => {
            (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[async_trait]
impl PhoneAuthProvider for MemoryPhoneAuth {
    async fn begin_phone_verification(
        &self,
        phone_number: &str,
        context: &DeliveryContext,
        _timeout: Duration,
    ) -> BackendResult<VerificationOutcome> {
        self.verification_requests.fetch_add(1, Ordering::SeqCst);

        if !is_valid_e164(phone_number) {
            return Err(BackendError::InvalidPhoneNumber(phone_number.to_string()));
        }

        let mut inner = self.lock()?;
        if let Some(error) = inner.rejected.get(phone_number) {
            return Err(error.clone());
        }

        if inner.instant.contains(phone_number) {
            let token = Uuid::new_v4().to_string();
            inner
                .instant_tokens
                .insert(token.clone(), phone_number.to_string());
            debug!(phone_number, "Instant verification");
            return Ok(VerificationOutcome::Instant(PhoneCredential::Instant {
                phone_number: phone_number.to_string(),
                token,
            }));
        }

        // A new request for the same number supersedes its previous challenge
        inner.challenges.retain(|_, number| number != phone_number);

        let verification_id = inner
            .next_ids
            .pop_front()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        inner
            .challenges
            .insert(verification_id.clone(), phone_number.to_string());

        debug!(
            phone_number,
            verification_id = %verification_id,
            channel = ?context.channel,
            "Code sent"
        );
        Ok(VerificationOutcome::CodeSent { verification_id })
    }

    async fn sign_in(&self, credential: PhoneCredential) -> BackendResult<AuthenticatedUser> {
        self.sign_in_attempts.fetch_add(1, Ordering::SeqCst);

        let mut inner = self.lock()?;
        if let Some(error) = inner.next_sign_in_failure.take() {
            return Err(error);
        }

        let phone_number = match credential {
            PhoneCredential::Code {
                verification_id,
                code,
            } => {
                let phone_number = inner
                    .challenges
                    .get(&verification_id)
                    .cloned()
                    .ok_or(BackendError::SessionExpired)?;
                if inner.codes.get(&phone_number) != Some(&code) {
                    return Err(BackendError::InvalidCode);
                }
                inner.challenges.remove(&verification_id);
                phone_number
            }
            PhoneCredential::Instant {
                phone_number,
                token,
            } => match inner.instant_tokens.remove(&token) {
                Some(issued_for) if issued_for == phone_number => phone_number,
                _ => return Err(BackendError::InvalidCode),
            },
        };

        let user_id = inner
            .users
            .entry(phone_number.clone())
            .or_insert_with(|| format!("uid-{}", Uuid::new_v4().simple()))
            .clone();

        let user = AuthenticatedUser {
            user_id,
            phone_number,
        };
        inner.current = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.lock()?.current = None;
        Ok(())
    }

    fn current_user(&self) -> Option<AuthenticatedUser> {
        self.inner.lock().ok().and_then(|inner| inner.current.clone())
    }
}
