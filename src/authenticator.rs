/* In-memory index from auth code to user, time/role policy evaluation, and
 * enrollment. A single `tokio::sync::Mutex` guards both the index and the
 * on-disk file so that append + index-update is one atomic step with
 * respect to concurrent readers. */
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::policy;
use crate::store;
use crate::target::Target;
use crate::user::{User, MIN_AUTH_CODE_LEN};

struct Inner {
    path: PathBuf,
    index: HashMap<String, User>,
}

pub struct Authenticator {
    clock: Arc<dyn Clock>,
    inner: tokio::sync::Mutex<Inner>,
}

impl Authenticator {
    /* Load all users from `path` at startup. Missing file is an empty store. */
    pub fn load(path: PathBuf, clock: Arc<dyn Clock>) -> std::io::Result<Self> {
        let users = store::load_from_path(&path)?;
        let mut index = HashMap::with_capacity(users.len());
        for user in users {
            index.insert(user.auth_code_hash.clone(), user);
        }
        info!(count = index.len(), path = %path.display(), "loaded users from disk");
        Ok(Self {
            clock,
            inner: tokio::sync::Mutex::new(Inner { path, index }),
        })
    }

    pub async fn find_user(&self, code: &str) -> Option<User> {
        self.inner.lock().await.index.get(code).cloned()
    }

    /* Evaluate the time/role policy for `code` at `target`. */
    pub async fn auth_user(&self, code: &str, target: Target) -> (bool, String) {
        let inner = self.inner.lock().await;
        let Some(user) = inner.index.get(code) else {
            return (false, "Unknown code".to_string());
        };
        let now = self.clock.now();
        let (allowed, reason) = policy::evaluate(now, user, target);
        debug!(%target, allowed, "policy evaluated");
        (allowed, reason)
    }

    /* Sponsor must be a currently-valid member; the new code must be unused
     * and at least `MIN_AUTH_CODE_LEN` characters. On any failure, state
     * and file are left untouched. */
    pub async fn add_new_user(
        &self,
        sponsor_code: &str,
        mut new_user: User,
    ) -> (bool, String) {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now();

        let Some(sponsor) = inner.index.get(sponsor_code) else {
            return (false, "Unknown sponsor code".to_string());
        };
        if !policy::is_valid_sponsor(now, sponsor) {
            return (false, "Sponsor is not a currently valid member".to_string());
        }
        let sponsor_name = sponsor.name.clone();

        if new_user.auth_code_hash.len() < MIN_AUTH_CODE_LEN {
            return (
                false,
                format!("Auth code must be at least {MIN_AUTH_CODE_LEN} characters"),
            );
        }
        if inner.index.contains_key(&new_user.auth_code_hash) {
            return (false, "Auth code already in use".to_string());
        }

        new_user.sponsor = sponsor_name;
        if new_user.is_anonymous() && new_user.valid_from.is_none() {
            /* Anonymous users auto-expire 30 days from enrollment; stamp
             * `valid_from` with the enrollment instant so that clock is
             * available to the policy's anonymous-expiry check. */
            new_user.valid_from = Some(now);
        }

        if let Err(e) = store::append_to_path(&inner.path, &new_user) {
            return (false, format!("Failed to persist new user: {e}"));
        }

        info!(code = %new_user.auth_code_hash, sponsor = %new_user.sponsor, "enrolled new user");
        inner.index.insert(new_user.auth_code_hash.clone(), new_user);
        (true, String::new())
    }
}
