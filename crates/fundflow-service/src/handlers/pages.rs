//! Page ownership and group configuration handlers.
//!
//! Called by the content service whenever page ownership or a group's
//! membership changes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use fundflow_core::{GroupDistributionConfig, GroupId, MemberShare, PageId, PageOwner, PageRecord};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Register page request.
#[derive(Debug, Deserialize)]
pub struct RegisterPageRequest {
    /// The page.
    pub page_id: PageId,
    /// Who earns from it.
    pub owner: PageOwner,
}

/// Register or move a page's owner.
pub async fn register_page(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(req): Json<RegisterPageRequest>,
) -> Result<Json<PageRecord>, ApiError> {
    let record = PageRecord {
        page_id: req.page_id,
        owner: req.owner,
        registered_at: Utc::now(),
    };
    state.store.put_page(&record)?;

    tracing::info!(
        page_id = %record.page_id,
        owner = ?record.owner,
        service = %service.service_name,
        "Page registered"
    );

    Ok(Json(record))
}

/// Group distribution request.
#[derive(Debug, Deserialize)]
pub struct GroupDistributionRequest {
    /// Member shares; must sum to 100.
    pub members: Vec<MemberShare>,
}

/// Group distribution response.
#[derive(Debug, Serialize)]
pub struct GroupDistributionResponse {
    /// The saved configuration.
    pub config: GroupDistributionConfig,
}

/// Replace a group's distribution configuration.
pub async fn set_group_distribution(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Path(group_id): Path<String>,
    Json(req): Json<GroupDistributionRequest>,
) -> Result<Json<GroupDistributionResponse>, ApiError> {
    let group_id: GroupId = group_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid group ID".into()))?;

    let config = GroupDistributionConfig::new(group_id, req.members)?;
    state.store.put_group_config(&config)?;

    tracing::info!(
        group_id = %group_id,
        members = config.members.len(),
        service = %service.service_name,
        "Group distribution updated"
    );

    Ok(Json(GroupDistributionResponse { config }))
}
