//! Public key lookup over LDAP.

use crate::{
    transport::{build_ldap_settings, server_url, Transport},
    Result,
};
use async_trait::async_trait;
use ldap3::{DerefAliases, LdapConnAsync, Scope, SearchEntry, SearchOptions};
use pubkey_core::config::USERNAME_PLACEHOLDER;
use pubkey_core::{Error, LookupConfig, KEY_ATTRIBUTE};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_ATTRIBUTES: &[&str] = &[KEY_ATTRIBUTE];

/// LDAP entry representation used by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserved order from server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns all values for the attribute, matching its name case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Looks up a user's stored SSH public keys.
pub struct PubkeyClient {
    config: Arc<LookupConfig>,
    connector: Box<dyn LdapConnector>,
}

impl PubkeyClient {
    /// Creates a client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: LookupConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(config: LookupConfig, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Fetches the configured user's keys in the order the server returned them.
    ///
    /// The connection is released whether or not the lookup succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the connection or anonymous bind fails, and
    /// [`Error::Lookup`] if the search fails or does not yield exactly one entry with at
    /// least one non-empty key.
    pub async fn fetch_keys(&self) -> Result<Vec<String>> {
        let mut session = self.connector.connect().await?;
        let outcome = self.bind_and_search(&mut *session).await;

        if let Err(err) = session.unbind().await {
            warn!("failed to release directory connection: {err}");
        }

        extract_keys(&outcome?)
    }

    async fn bind_and_search(&self, session: &mut dyn LdapSession) -> Result<Vec<LdapEntry>> {
        session.simple_bind("", "").await?;
        debug!("anonymous bind succeeded");

        let filter = self.user_search_filter();
        debug!(base = self.config.base(), filter = %filter, "searching directory");
        let entries = session
            .search(self.config.base(), &filter, KEY_ATTRIBUTES)
            .await?;
        debug!("search returned {} entries", entries.len());
        Ok(entries)
    }

    fn user_search_filter(&self) -> String {
        user_search_filter(self.config.filter(), self.config.username())
    }
}

/// Substitutes the escaped username for the `%s` placeholder in `template`.
///
/// A literal `%%` in the template stands for a single `%`.
fn user_search_filter(template: &str, username: &str) -> String {
    let escaped = escape_filter_value(username);
    match template.split_once(USERNAME_PLACEHOLDER) {
        Some((head, tail)) => format!(
            "{}{escaped}{}",
            head.replace("%%", "%"),
            tail.replace("%%", "%")
        ),
        None => template.replace("%%", "%"),
    }
}

/// Validates a search result and returns the key values of its single entry.
///
/// Empty values are dropped. Every other value, whitespace included, is kept verbatim
/// in server order.
///
/// # Errors
///
/// Returns [`Error::Lookup`] unless `entries` holds exactly one entry with at least one
/// non-empty `sshPublicKey` value.
pub fn extract_keys(entries: &[LdapEntry]) -> Result<Vec<String>> {
    let [entry] = entries else {
        return Err(Error::Lookup(
            "user does not exist or too many entries returned".to_string(),
        ));
    };
    debug!(dn = %entry.dn, "found user entry");

    let keys = entry
        .values(KEY_ATTRIBUTE)
        .iter()
        .filter(|value| !value.is_empty())
        .cloned()
        .collect::<Vec<_>>();

    if keys.is_empty() {
        return Err(Error::Lookup(
            "user does not use a stored public key".to_string(),
        ));
    }
    Ok(keys)
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<LookupConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<LookupConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let transport = Transport::select(&self.config);
        let settings = build_ldap_settings(&self.config, transport)?;
        let url = server_url(&self.config, transport);
        debug!(url = %url, ?transport, "connecting to directory");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|err| Error::Connection(format!("{url}: {err}")))?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession { inner: ldap }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.inner
            .simple_bind(dn, password)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(|err| Error::Connection(format!("bind failed: {err}")))?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let options = SearchOptions::new()
            .deref(DerefAliases::Never)
            .sizelimit(0)
            .timelimit(0);
        let (entries, _) = self
            .inner
            .with_search_options(options)
            .search(base_dn, Scope::Subtree, filter, attributes.to_vec())
            .await
            .and_then(ldap3::result::SearchResult::success)
            .map_err(|err| Error::Lookup(format!("search failed: {err}")))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner
            .unbind()
            .await
            .map_err(|err| Error::Connection(format!("unbind failed: {err}")))
    }
}

fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
