//! In-memory directory served over TCP.
//!
//! ```text
//! cargo run --example memory_directory -- [config.toml]
//! ldapsearch -x -H ldap://127.0.0.1:10389 -b dc=example,dc=com '(objectClass=person)'
//! ldapwhoami -x -H ldap://127.0.0.1:10389 -D uid=admin,ou=Users,dc=example,dc=com -w secret
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::info;

use ldap_protocol::config::LdapConfig;
use ldap_protocol::error::Result;
use ldap_protocol::protocol::dn::Dn;
use ldap_protocol::protocol::filter::{values_of, Attributes};
use ldap_protocol::protocol::message::{
    AddRequest, CompareRequest, ModifyDnRequest, ModifyOperation, ModifyRequest, SearchRequest,
};
use ldap_protocol::protocol::result::{LdapError, LdapResult};
use ldap_protocol::protocol::router::{OperationKind, Router};
use ldap_protocol::service::handler::{Handler, RequestContext, SearchSink};
use ldap_protocol::service::LdapServer;
use ldap_protocol::utils::logging::init_logging;
use ldap_protocol::utils::metrics::{global_metrics, init_metrics};

const SUFFIX: &str = "dc=example,dc=com";

/// Entries keyed by DN
#[derive(Default)]
struct MemoryDirectory {
    entries: RwLock<BTreeMap<String, (Dn, Attributes)>>,
}

fn key(dn: &Dn) -> String {
    dn.to_string().to_ascii_lowercase()
}

impl MemoryDirectory {
    fn seeded() -> Self {
        let directory = Self::default();
        let seed: &[(&str, &[(&str, &str)])] = &[
            (SUFFIX, &[("objectClass", "domain"), ("dc", "example")]),
            (
                "ou=Users,dc=example,dc=com",
                &[("objectClass", "organizationalUnit"), ("ou", "Users")],
            ),
            (
                "uid=admin,ou=Users,dc=example,dc=com",
                &[
                    ("objectClass", "person"),
                    ("cn", "Directory Admin"),
                    ("userPassword", "secret"),
                ],
            ),
            (
                "uid=alice,ou=Users,dc=example,dc=com",
                &[
                    ("objectClass", "person"),
                    ("cn", "Alice Liddell"),
                    ("mail", "alice@example.com"),
                    ("userPassword", "wonderland"),
                ],
            ),
        ];
        if let Ok(mut entries) = directory.entries.write() {
            for (dn, pairs) in seed {
                let Ok(dn) = Dn::parse(dn) else { continue };
                let mut attrs = Attributes::new();
                for (name, value) in *pairs {
                    attrs.entry(name.to_string()).or_default().push(value.as_bytes().to_vec());
                }
                entries.insert(key(&dn), (dn, attrs));
            }
        }
        directory
    }

    fn read(&self) -> LdapResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, (Dn, Attributes)>>> {
        self.entries
            .read()
            .map_err(|_| LdapError::operations_error("directory lock poisoned"))
    }

    fn write(&self) -> LdapResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, (Dn, Attributes)>>> {
        self.entries
            .write()
            .map_err(|_| LdapError::operations_error("directory lock poisoned"))
    }
}

fn require_bind(ctx: &RequestContext) -> LdapResult<()> {
    if ctx.is_anonymous() {
        return Err(LdapError::new(
            ldap_protocol::ResultCode::InsufficientAccessRights,
            "Updates require an authenticated bind",
        ));
    }
    Ok(())
}

#[async_trait]
impl Handler for MemoryDirectory {
    async fn bind(&self, _ctx: &RequestContext, _version: i32, dn: &Dn, password: &[u8]) -> LdapResult<()> {
        let entries = self.read()?;
        let stored = entries
            .get(&key(dn))
            .and_then(|(_, attrs)| values_of(attrs, "userPassword"));
        match stored {
            Some(values) if values.iter().any(|v| v.as_slice() == password) => Ok(()),
            _ => Err(LdapError::invalid_credentials("Invalid credentials")),
        }
    }

    async fn search(&self, _ctx: &RequestContext, request: &SearchRequest, sink: &mut SearchSink) -> LdapResult<()> {
        // Snapshot so the lock is not held across awaits
        let candidates: Vec<(String, Attributes)> = {
            let entries = self.read()?;
            if !entries.contains_key(&key(&request.base)) {
                return Err(LdapError::no_such_object("Base entry does not exist"));
            }
            entries
                .values()
                .filter(|(dn, _)| request.scope.contains(&request.base, dn))
                .map(|(dn, attrs)| {
                    let mut visible = attrs.clone();
                    visible.remove("userPassword");
                    (dn.to_string(), visible)
                })
                .collect()
        };
        for (dn, attrs) in candidates {
            sink.send_if_matches(&dn, &attrs).await?;
        }
        Ok(())
    }

    async fn add(&self, ctx: &RequestContext, request: &AddRequest) -> LdapResult<()> {
        require_bind(ctx)?;
        let mut entries = self.write()?;
        let parent = request.dn.parent().unwrap_or_default();
        if !entries.contains_key(&key(&parent)) {
            return Err(LdapError::no_such_object("Parent entry does not exist"));
        }
        if entries.contains_key(&key(&request.dn)) {
            return Err(LdapError::entry_already_exists("Entry already exists"));
        }
        entries.insert(key(&request.dn), (request.dn.clone(), request.attributes.clone()));
        info!(dn = %request.dn, "Entry added");
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, dn: &Dn) -> LdapResult<()> {
        require_bind(ctx)?;
        let mut entries = self.write()?;
        let target = key(dn);
        let suffix = format!(",{target}");
        if entries.keys().any(|k| k.ends_with(&suffix)) {
            return Err(LdapError::new(
                ldap_protocol::ResultCode::NotAllowedOnNonLeaf,
                "Entry has children",
            ));
        }
        entries
            .remove(&target)
            .map(|_| ())
            .ok_or_else(|| LdapError::no_such_object("No such entry"))
    }

    async fn modify(&self, ctx: &RequestContext, request: &ModifyRequest) -> LdapResult<()> {
        require_bind(ctx)?;
        let mut entries = self.write()?;
        let (_, attrs) = entries
            .get_mut(&key(&request.dn))
            .ok_or_else(|| LdapError::no_such_object("No such entry"))?;
        for change in &request.changes {
            match change.operation {
                ModifyOperation::Add => attrs
                    .entry(change.attr.clone())
                    .or_default()
                    .extend(change.values.iter().cloned()),
                ModifyOperation::Replace if change.values.is_empty() => {
                    attrs.remove(&change.attr);
                }
                ModifyOperation::Replace => {
                    attrs.insert(change.attr.clone(), change.values.clone());
                }
                ModifyOperation::Delete if change.values.is_empty() => {
                    attrs.remove(&change.attr);
                }
                ModifyOperation::Delete => {
                    if let Some(values) = attrs.get_mut(&change.attr) {
                        values.retain(|v| !change.values.contains(v));
                        if values.is_empty() {
                            attrs.remove(&change.attr);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, ctx: &RequestContext, request: &ModifyDnRequest) -> LdapResult<()> {
        require_bind(ctx)?;
        let new_dn = request.new_dn();
        let mut entries = self.write()?;
        if entries.contains_key(&key(&new_dn)) {
            return Err(LdapError::entry_already_exists("Target entry already exists"));
        }
        let (_, attrs) = entries
            .remove(&key(&request.dn))
            .ok_or_else(|| LdapError::no_such_object("No such entry"))?;
        entries.insert(key(&new_dn), (new_dn, attrs));
        Ok(())
    }

    async fn compare(&self, _ctx: &RequestContext, request: &CompareRequest) -> LdapResult<bool> {
        let entries = self.read()?;
        let (_, attrs) = entries
            .get(&key(&request.dn))
            .ok_or_else(|| LdapError::no_such_object("No such entry"))?;
        Ok(values_of(attrs, &request.attr).is_some_and(|values| values.contains(&request.value)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => LdapConfig::from_file(path)?,
        None => LdapConfig::default_with_overrides(|c| {
            c.server.address = "127.0.0.1:10389".into();
        }),
    };
    if config.root.naming_contexts.is_empty() {
        config.root.naming_contexts = vec![SUFFIX.into()];
    }
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let directory = Arc::new(MemoryDirectory::seeded());
    let mut router = Router::new();
    for kind in [
        OperationKind::Bind,
        OperationKind::Search,
        OperationKind::Add,
        OperationKind::Delete,
        OperationKind::Modify,
        OperationKind::ModifyDn,
        OperationKind::Compare,
    ] {
        router.route(kind, SUFFIX, directory.clone())?;
    }

    info!(address = %config.server.address, "Starting in-memory directory");
    init_metrics();
    let server = LdapServer::new(config, router)?;
    let result = server.run().await;
    global_metrics().log_metrics();
    result
}
