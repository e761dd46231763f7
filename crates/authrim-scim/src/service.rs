//! SCIM provisioning services for Users and Groups
//!
//! List/get/create/replace/patch/delete with optimistic concurrency.
//! Mutations apply to an in-memory copy, re-validate, then persist through
//! the store in one call.

use crate::error::ScimError;
use crate::etag::{etag_matches, weak_etag};
use crate::filter::{self, FilterNode};
use crate::patch::{self, PatchRequest};
use crate::resources;
use crate::search::{GroupSearchBackend, UserSearchBackend};
use crate::sql::{self, ResourceTable};
use authrim_audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use authrim_core::stores::{RoleStore, UserStore};
use serde_json::Value;
use std::sync::Arc;

/// Query parameters accepted on list endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: Option<String>,
    /// 1-based.
    pub start_index: Option<i64>,
    pub count: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// A resource plus its current version tag.
#[derive(Debug, Clone)]
pub struct VersionedResource {
    pub resource: Value,
    pub etag: String,
}

/// GET with If-None-Match can short-circuit.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Fresh(VersionedResource),
    NotModified { etag: String },
}

/// Parse and allow-list-validate the `filter` query parameter. Unmapped
/// attributes fail here with `invalidFilter`, before any backend runs.
fn parse_list_filter(
    query: &ListQuery,
    table: ResourceTable,
) -> Result<Option<FilterNode>, ScimError> {
    match query.filter.as_deref() {
        Some(raw) => {
            let ast = filter::parse(raw)?;
            sql::validate_attributes(&ast, table)?;
            Ok(Some(ast))
        }
        None => Ok(None),
    }
}

fn paginate(
    mut resources: Vec<Value>,
    query: &ListQuery,
    max_page_size: usize,
) -> Result<Value, ScimError> {
    if let Some(sort_by) = query.sort_by.as_deref() {
        let path = filter::parse(&format!("{} pr", sort_by))
            .map_err(|_| ScimError::invalid_value("malformed sortBy attribute"))?;
        let attr = match path {
            filter::FilterNode::Present { attr } => attr,
            _ => return Err(ScimError::invalid_value("malformed sortBy attribute")),
        };
        let key = |resource: &Value| -> String {
            let mut current = resource.clone();
            for segment in &attr.segments {
                current = current
                    .as_object()
                    .and_then(|o| {
                        o.iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case(segment))
                            .map(|(_, v)| v.clone())
                    })
                    .unwrap_or(Value::Null);
            }
            match current {
                Value::String(s) => s.to_lowercase(),
                other => other.to_string(),
            }
        };
        resources.sort_by_key(key);
        if query
            .sort_order
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("descending"))
        {
            resources.reverse();
        }
    }

    let total = resources.len();
    let start_index = query.start_index.unwrap_or(1).max(1) as usize;
    let count = query
        .count
        .map(|c| c.max(0) as usize)
        .unwrap_or(max_page_size)
        .min(max_page_size);

    let page: Vec<Value> = resources
        .into_iter()
        .skip(start_index - 1)
        .take(count)
        .collect();

    Ok(resources::list_response(total, start_index, page))
}

fn check_if_match(if_match: Option<&str>, current_etag: &str) -> Result<(), ScimError> {
    if let Some(header) = if_match {
        if !etag_matches(header, current_etag) {
            return Err(ScimError::invalid_version(
                "resource version does not match If-Match",
            ));
        }
    }
    Ok(())
}

pub struct ScimUserService {
    users: Arc<dyn UserStore>,
    search: Arc<dyn UserSearchBackend>,
    audit: Arc<dyn AuditLogger>,
    max_page_size: usize,
}

impl ScimUserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        search: Arc<dyn UserSearchBackend>,
        audit: Arc<dyn AuditLogger>,
        max_page_size: usize,
    ) -> Self {
        Self {
            users,
            search,
            audit,
            max_page_size,
        }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Value, ScimError> {
        let filter_ast = parse_list_filter(query, ResourceTable::Users)?;
        let users = self.search.search(filter_ast.as_ref()).await?;
        let resources: Vec<Value> = users.iter().map(resources::to_scim_user).collect();
        paginate(resources, query, self.max_page_size)
    }

    pub async fn get(&self, id: &str, if_none_match: Option<&str>) -> Result<GetOutcome, ScimError> {
        let user = self
            .users
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("User {}", id)))?;
        let resource = resources::to_scim_user(&user);
        let etag = weak_etag(&resource);

        if let Some(header) = if_none_match {
            if etag_matches(header, &etag) {
                return Ok(GetOutcome::NotModified { etag });
            }
        }
        Ok(GetOutcome::Fresh(VersionedResource { resource, etag }))
    }

    pub async fn create(&self, payload: &Value) -> Result<VersionedResource, ScimError> {
        let user = resources::from_scim_user(payload, None)?;
        self.users.insert(user.clone()).await?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_user_created", AuditSeverity::Info)
                    .with_resource(format!("user:{}", user.id)),
            )
            .await;

        let resource = resources::to_scim_user(&user);
        let etag = weak_etag(&resource);
        Ok(VersionedResource { resource, etag })
    }

    pub async fn replace(
        &self,
        id: &str,
        payload: &Value,
        if_match: Option<&str>,
    ) -> Result<VersionedResource, ScimError> {
        let existing = self
            .users
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("User {}", id)))?;
        check_if_match(if_match, &weak_etag(&resources::to_scim_user(&existing)))?;

        let user = resources::from_scim_user(payload, Some(&existing))?;
        self.users.update(user.clone()).await?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_user_replaced", AuditSeverity::Info)
                    .with_resource(format!("user:{}", id)),
            )
            .await;

        let resource = resources::to_scim_user(&user);
        let etag = weak_etag(&resource);
        Ok(VersionedResource { resource, etag })
    }

    pub async fn patch(
        &self,
        id: &str,
        request: &PatchRequest,
        if_match: Option<&str>,
    ) -> Result<VersionedResource, ScimError> {
        let existing = self
            .users
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("User {}", id)))?;
        let mut working = resources::to_scim_user(&existing);
        check_if_match(if_match, &weak_etag(&working))?;

        patch::apply(&mut working, &request.operations)?;
        let user = resources::from_scim_user(&working, Some(&existing))?;
        self.users.update(user.clone()).await?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_user_patched", AuditSeverity::Info)
                    .with_resource(format!("user:{}", id)),
            )
            .await;

        let resource = resources::to_scim_user(&user);
        let etag = weak_etag(&resource);
        Ok(VersionedResource { resource, etag })
    }

    pub async fn delete(&self, id: &str, if_match: Option<&str>) -> Result<(), ScimError> {
        let existing = self
            .users
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("User {}", id)))?;
        check_if_match(if_match, &weak_etag(&resources::to_scim_user(&existing)))?;

        self.users.delete(id).await?;
        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_user_deleted", AuditSeverity::Info)
                    .with_resource(format!("user:{}", id)),
            )
            .await;
        Ok(())
    }
}

pub struct ScimGroupService {
    roles: Arc<dyn RoleStore>,
    search: Arc<dyn GroupSearchBackend>,
    audit: Arc<dyn AuditLogger>,
    max_page_size: usize,
}

impl ScimGroupService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        search: Arc<dyn GroupSearchBackend>,
        audit: Arc<dyn AuditLogger>,
        max_page_size: usize,
    ) -> Self {
        Self {
            roles,
            search,
            audit,
            max_page_size,
        }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Value, ScimError> {
        let filter_ast = parse_list_filter(query, ResourceTable::Groups)?;
        let roles = self.search.search(filter_ast.as_ref()).await?;
        let resources: Vec<Value> = roles.iter().map(resources::to_scim_group).collect();
        paginate(resources, query, self.max_page_size)
    }

    pub async fn get(&self, id: &str, if_none_match: Option<&str>) -> Result<GetOutcome, ScimError> {
        let role = self
            .roles
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("Group {}", id)))?;
        let resource = resources::to_scim_group(&role);
        let etag = weak_etag(&resource);

        if let Some(header) = if_none_match {
            if etag_matches(header, &etag) {
                return Ok(GetOutcome::NotModified { etag });
            }
        }
        Ok(GetOutcome::Fresh(VersionedResource { resource, etag }))
    }

    pub async fn create(&self, payload: &Value) -> Result<VersionedResource, ScimError> {
        let role = resources::from_scim_group(payload, None)?;
        self.roles.insert(role.clone()).await?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_group_created", AuditSeverity::Info)
                    .with_resource(format!("group:{}", role.id)),
            )
            .await;

        let resource = resources::to_scim_group(&role);
        let etag = weak_etag(&resource);
        Ok(VersionedResource { resource, etag })
    }

    /// PUT: replaces the group attributes and the entire member set. The
    /// store persists membership and the group row as one update.
    pub async fn replace(
        &self,
        id: &str,
        payload: &Value,
        if_match: Option<&str>,
    ) -> Result<VersionedResource, ScimError> {
        let existing = self
            .roles
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("Group {}", id)))?;
        check_if_match(if_match, &weak_etag(&resources::to_scim_group(&existing)))?;

        let role = resources::from_scim_group(payload, Some(&existing))?;
        self.roles.update(role.clone()).await?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_group_replaced", AuditSeverity::Info)
                    .with_resource(format!("group:{}", id)),
            )
            .await;

        let resource = resources::to_scim_group(&role);
        let etag = weak_etag(&resource);
        Ok(VersionedResource { resource, etag })
    }

    pub async fn patch(
        &self,
        id: &str,
        request: &PatchRequest,
        if_match: Option<&str>,
    ) -> Result<VersionedResource, ScimError> {
        let existing = self
            .roles
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("Group {}", id)))?;
        let mut working = resources::to_scim_group(&existing);
        check_if_match(if_match, &weak_etag(&working))?;

        patch::apply(&mut working, &request.operations)?;
        let role = resources::from_scim_group(&working, Some(&existing))?;
        self.roles.update(role.clone()).await?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_group_patched", AuditSeverity::Info)
                    .with_resource(format!("group:{}", id)),
            )
            .await;

        let resource = resources::to_scim_group(&role);
        let etag = weak_etag(&resource);
        Ok(VersionedResource { resource, etag })
    }

    pub async fn delete(&self, id: &str, if_match: Option<&str>) -> Result<(), ScimError> {
        let existing = self
            .roles
            .get(id)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("Group {}", id)))?;
        check_if_match(if_match, &weak_etag(&resources::to_scim_group(&existing)))?;

        self.roles.delete(id).await?;
        self.audit
            .log(
                AuditEvent::new(AuditCategory::Provisioning, "scim_group_deleted", AuditSeverity::Info)
                    .with_resource(format!("group:{}", id)),
            )
            .await;
        Ok(())
    }
}
