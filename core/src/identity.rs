use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::clients::SourceClient;
use crate::jid::Jid;
use crate::store::CorrelationStore;

/// Display names for source-side users and groups.
///
/// Lookups never fail: a stale name is fine and a missing one falls back to the
/// raw identifier.
pub struct IdentityResolver {
    store: Arc<dyn CorrelationStore>,
    source: Arc<dyn SourceClient>,
    contacts: DashMap<String, String>,
    groups: DashMap<String, String>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn CorrelationStore>, source: Arc<dyn SourceClient>) -> Self {
        Self {
            store,
            source,
            contacts: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    pub async fn contact_name(&self, jid: &Jid) -> String {
        if let Some(name) = self.contacts.get(&jid.user) {
            return name.clone();
        }

        let non_ad = jid.to_non_ad();
        match self.source.get_contact_name(&non_ad).await {
            Ok(Some(name)) if !name.trim().is_empty() => {
                self.contacts.insert(jid.user.clone(), name.clone());
                return name;
            }
            Ok(_) => {}
            Err(err) => debug!(jid = %non_ad, error = %err, "source contact lookup failed"),
        }

        match self.store.get_contact_name(&jid.user) {
            Ok(Some(name)) => {
                self.contacts.insert(jid.user.clone(), name.clone());
                return name;
            }
            Ok(None) => {}
            Err(err) => warn!(jid = %non_ad, error = %err, "failed to read cached push name"),
        }

        fallback_name(&non_ad)
    }

    pub async fn group_name(&self, group: &Jid) -> String {
        let key = group.to_non_ad().to_string();
        if let Some(name) = self.groups.get(&key) {
            return name.clone();
        }
        match self.source.get_group_name(group).await {
            Ok(name) if !name.trim().is_empty() => {
                self.groups.insert(key, name.clone());
                name
            }
            Ok(_) => key,
            Err(err) => {
                debug!(group = %key, error = %err, "group name lookup failed");
                key
            }
        }
    }

    /// Called for push-name change events.
    pub fn update_push_name(&self, jid: &Jid, push_name: &str) {
        if push_name.trim().is_empty() {
            return;
        }
        self.contacts.insert(jid.user.clone(), push_name.to_string());
        if let Err(err) = self.store.put_contact_name(&jid.user, push_name) {
            warn!(jid = %jid, error = %err, "failed to persist push name");
        }
    }

    pub fn update_group_name(&self, group: &Jid, name: &str) {
        self.groups.insert(group.to_non_ad().to_string(), name.to_string());
    }
}

fn fallback_name(jid: &Jid) -> String {
    if jid.is_user() {
        format!("+{}", jid.user)
    } else {
        jid.to_string()
    }
}
