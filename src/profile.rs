//! Site billing profiles and the profile store seam.
//!
//! Profiles live in a document store owned by the surrounding app; this
//! crate only reads them. Decoding happens once, at the store boundary: a
//! raw document either becomes a fully typed [`SiteBillingProfile`] or an
//! explicit decode error; partially typed values never propagate forward.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Persisted record linking a site to its plan flags and payment-provider
/// customer identity. One profile per site; mutated only by an operator
/// path outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteBillingProfile {
    /// Unique site key (the document id in the profile store).
    pub site_key: String,
    /// Free-plan sites are never gated.
    pub is_free_plan: bool,
    /// Setup-mode sites resolve to `setup_mode` regardless of subscriptions.
    pub setup_mode: bool,
    /// Linked provider customer, if any.
    pub stripe_customer_id: Option<String>,
    /// Owner email, used to let the provider create the customer record
    /// when no customer is linked yet.
    pub owner_email: Option<String>,
}

impl SiteBillingProfile {
    /// Whether the profile has a linked provider customer.
    #[must_use]
    pub fn has_customer(&self) -> bool {
        self.stripe_customer_id.is_some()
    }

    /// Decode a raw profile document into a typed profile.
    ///
    /// Absent flags default to `false` and absent identifiers to `None`
    /// (matching what the store actually contains for never-billed sites),
    /// but a wrong-typed field is a hard decode error.
    ///
    /// # Errors
    ///
    /// Returns a `Provider` error naming the offending document when the
    /// document does not match the profile schema.
    pub fn from_document(site_key: &str, document: &serde_json::Value) -> Result<Self> {
        let fields: ProfileFields = serde_json::from_value(document.clone()).map_err(|e| {
            GateError::provider(
                "decode_profile",
                format!("siteSettings/{site_key}: {e}"),
            )
        })?;

        Ok(Self {
            site_key: site_key.to_string(),
            is_free_plan: fields.is_free_plan,
            setup_mode: fields.setup_mode,
            stripe_customer_id: fields.stripe_customer_id,
            owner_email: fields.owner_email,
        })
    }
}

/// The subset of a profile document this crate consumes. Unknown fields are
/// ignored; the documents carry plenty of storefront data we never read.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFields {
    #[serde(default)]
    is_free_plan: bool,
    #[serde(default)]
    setup_mode: bool,
    #[serde(default)]
    stripe_customer_id: Option<String>,
    #[serde(default)]
    owner_email: Option<String>,
}

/// Typed read seam over the site-profile store.
#[async_trait]
pub trait SiteProfileStore: Send + Sync {
    /// Fetch the billing profile for a site, if one exists.
    async fn fetch_profile(&self, site_key: &str) -> Result<Option<SiteBillingProfile>>;
}

/// Seam over the raw document store, for backends that hand out untyped
/// JSON documents.
#[async_trait]
pub trait ProfileDocumentSource: Send + Sync {
    /// Fetch the raw profile document for a site, if one exists.
    async fn fetch_document(&self, site_key: &str) -> Result<Option<serde_json::Value>>;
}

/// Profile store that decodes raw documents at the boundary.
///
/// Wrap any [`ProfileDocumentSource`] to obtain a [`SiteProfileStore`] that
/// yields typed profiles or explicit decode errors.
#[derive(Debug, Clone)]
pub struct DecodingProfileStore<D> {
    source: D,
}

impl<D: ProfileDocumentSource> DecodingProfileStore<D> {
    #[must_use]
    pub fn new(source: D) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<D: ProfileDocumentSource> SiteProfileStore for DecodingProfileStore<D> {
    async fn fetch_profile(&self, site_key: &str) -> Result<Option<SiteBillingProfile>> {
        match self.source.fetch_document(site_key).await? {
            Some(document) => Ok(Some(SiteBillingProfile::from_document(site_key, &document)?)),
            None => Ok(None),
        }
    }
}

/// In-memory stores for testing.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, RwLock};

    /// In-memory profile store for testing.
    ///
    /// Wraps data in `Arc` for cheap cloning. Can be told to fail reads to
    /// exercise fail-closed paths.
    #[derive(Default, Clone)]
    pub struct InMemoryProfileStore {
        inner: Arc<InMemoryProfileStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryProfileStoreInner {
        profiles: RwLock<HashMap<String, SiteBillingProfile>>,
        fail_reads: AtomicBool,
    }

    impl InMemoryProfileStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a profile.
        pub fn insert(&self, profile: SiteBillingProfile) {
            self.inner
                .profiles
                .write()
                .unwrap()
                .insert(profile.site_key.clone(), profile);
        }

        /// Make every subsequent read fail with a provider error.
        pub fn fail_reads(&self, fail: bool) {
            self.inner.fail_reads.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SiteProfileStore for InMemoryProfileStore {
        async fn fetch_profile(&self, site_key: &str) -> Result<Option<SiteBillingProfile>> {
            if self.inner.fail_reads.load(Ordering::SeqCst) {
                return Err(GateError::provider(
                    "fetch_profile",
                    "simulated store failure",
                ));
            }
            Ok(self.inner.profiles.read().unwrap().get(site_key).cloned())
        }
    }

    /// In-memory raw document source for decode-boundary tests.
    #[derive(Default, Clone)]
    pub struct InMemoryDocumentSource {
        documents: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    }

    impl InMemoryDocumentSource {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a raw document.
        pub fn insert(&self, site_key: impl Into<String>, document: serde_json::Value) {
            self.documents
                .write()
                .unwrap()
                .insert(site_key.into(), document);
        }
    }

    #[async_trait]
    impl ProfileDocumentSource for InMemoryDocumentSource {
        async fn fetch_document(&self, site_key: &str) -> Result<Option<serde_json::Value>> {
            Ok(self.documents.read().unwrap().get(site_key).cloned())
        }
    }

    /// Shorthand for building a profile in tests.
    #[must_use]
    pub fn profile(
        site_key: &str,
        is_free_plan: bool,
        setup_mode: bool,
        stripe_customer_id: Option<&str>,
    ) -> SiteBillingProfile {
        SiteBillingProfile {
            site_key: site_key.to_string(),
            is_free_plan,
            setup_mode,
            stripe_customer_id: stripe_customer_id.map(str::to_string),
            owner_email: None,
        }
    }
}
