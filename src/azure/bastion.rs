//! Bastion host discovery via `az network bastion list`.

use serde::Deserialize;
use tracing::debug;

use super::{AzCli, AzError, AzResult};

/// A Bastion host as reported by `az network bastion list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BastionHost {
    /// Bastion name
    pub name: String,
    /// Full Azure resource ID
    pub id: String,
    /// Resource group containing the Bastion
    pub resource_group: String,
    /// Azure region
    pub location: String,
}

impl AzCli {
    /// List Bastion hosts, optionally restricted to a resource group.
    pub async fn list_bastions(&self, resource_group: Option<&str>) -> AzResult<Vec<BastionHost>> {
        let mut args = vec!["network", "bastion", "list"];
        if let Some(rg) = resource_group {
            args.extend(["-g", rg]);
        }

        let value = self.run(&args).await?;
        serde_json::from_value(value).map_err(|source| AzError::MalformedJson {
            command: args.join(" "),
            source,
        })
    }

    /// Select the Bastion to tunnel through.
    ///
    /// A preferred name (CLI flag or config) is matched against the listing;
    /// otherwise the sole Bastion in the resource group is used. Multiple
    /// Bastions without a preference pick the first by name.
    pub async fn pick_bastion(
        &self,
        resource_group: Option<&str>,
        preferred: Option<&str>,
    ) -> AzResult<BastionHost> {
        let mut bastions = self.list_bastions(resource_group).await?;

        if bastions.is_empty() {
            return Err(AzError::NoBastion(
                resource_group.unwrap_or("<any>").to_string(),
            ));
        }

        if let Some(name) = preferred {
            return bastions
                .into_iter()
                .find(|b| b.name == name)
                .ok_or_else(|| AzError::NoBastion(format!("{} (no bastion named '{}')", resource_group.unwrap_or("<any>"), name)));
        }

        bastions.sort_by(|a, b| a.name.cmp(&b.name));
        let bastion = bastions.swap_remove(0);
        debug!(bastion = %bastion.name, rg = %bastion.resource_group, "Selected Bastion host");
        Ok(bastion)
    }
}
