//! Test parameter resolution.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DEFAULT_PARAMETER_SET, DEFAULT_UPGRADE_TYPE, TestItem, TestParameters};
use crate::store::Catalog;

/// Resolved parameters and the set they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    pub parameter_set_id: Option<Uuid>,
    pub parameters: TestParameters,
}

/// Resolve the parameters for a run of `item`.
///
/// Lookup order: the explicit set (which must exist), the item's associated
/// set, then the set named "default". With none of them the empty parameters
/// are used. Empty `service_name`/`report_keyword` take the item's name and
/// an empty `upgrade_type` becomes "full".
pub async fn resolve_parameters(
    catalog: &dyn Catalog,
    item: &TestItem,
    explicit: Option<Uuid>,
) -> AppResult<ResolvedParameters> {
    let set = match explicit {
        Some(id) => Some(
            catalog
                .get_parameter_set(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Parameter set {}", id)))?,
        ),
        None => {
            let associated = match item.associated_parameter_set_id {
                Some(id) => {
                    let found = catalog.get_parameter_set(id).await?;
                    if found.is_none() {
                        warn!(
                            test_item = %item.name,
                            parameter_set_id = %id,
                            "Associated parameter set missing, falling back to default"
                        );
                    }
                    found
                }
                None => None,
            };
            match associated {
                Some(set) => Some(set),
                None => catalog.find_parameter_set_by_name(DEFAULT_PARAMETER_SET).await?,
            }
        }
    };

    let (parameter_set_id, mut parameters) = match set {
        Some(set) => {
            debug!(test_item = %item.name, parameter_set = %set.name, "Resolved parameter set");
            (Some(set.id), set.parameters)
        }
        None => {
            warn!(test_item = %item.name, "No parameter set found, using empty parameters");
            (None, TestParameters::default())
        }
    };

    if parameters.service_name.is_empty() {
        parameters.service_name = item.name.clone();
    }
    if parameters.report_keyword.is_empty() {
        parameters.report_keyword = item.name.clone();
    }
    if parameters.upgrade_type.is_empty() {
        parameters.upgrade_type = DEFAULT_UPGRADE_TYPE.to_string();
    }

    Ok(ResolvedParameters {
        parameter_set_id,
        parameters,
    })
}
