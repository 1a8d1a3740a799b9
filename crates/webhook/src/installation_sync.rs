//! Installation Sync (§4.H): reconciles organization membership against the
//! User collection after an installation is created on an org account.

use prhub_broker::CredentialBroker;
use prhub_core::HubResult;
use prhub_store::Storage;
use tracing::warn;

pub struct SyncOutcome {
    pub updated: u64,
    pub errors: Vec<String>,
}

pub async fn sync_installation_members(
    store: &dyn Storage,
    broker: &CredentialBroker,
    installation_id: i64,
    org_login: &str,
) -> HubResult<SyncOutcome> {
    let client = broker.installation_client(installation_id).await?;
    let members = client.list_org_members(org_login).await?;

    let mut updated = 0;
    let mut errors = Vec::new();

    for member in members {
        match store.get_user_by_username(&member.login).await {
            Ok(Some(user)) => {
                if !user.has_installation(installation_id) {
                    if let Err(e) = store.add_installation_to_user(&user.id, installation_id).await {
                        warn!(login = %member.login, error = %e, "failed to link user to installation");
                        errors.push(format!("{}: {e}", member.login));
                    } else {
                        updated += 1;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(login = %member.login, error = %e, "failed to look up user during sync");
                errors.push(format!("{}: {e}", member.login));
            }
        }
    }

    Ok(SyncOutcome { updated, errors })
}
