//! Templates generated from live provider state.
//!
//! Used to bring resources that already exist in a tenant under template
//! management. Generated templates carry only what the provider reports;
//! lifecycle fields are left unset.

use iamsync_core::{GroupProperties, Template, TenantConfig, UserProperties};
use std::path::PathBuf;

use crate::adapter::{GroupState, UserState};

/// Template describing `group` as it exists in `tenant`.
///
/// The stored `resource_id` is kept only when it differs from the one a
/// template derives from tenant and name.
pub fn group_template(group: &GroupState, tenant: &TenantConfig) -> Template {
    let mut properties = GroupProperties::new(&group.name, &tenant.name);
    if properties.resource_id() != group.resource_id {
        properties.resource_id = Some(group.resource_id.clone());
    }
    properties.description = group.description.clone();
    properties.members = group.members.clone();

    let path = template_path("groups", tenant, &group.name);
    Template::group(path.to_string_lossy(), properties)
}

/// Template describing `user` as it exists in `tenant`.
pub fn user_template(user: &UserState, tenant: &TenantConfig) -> Template {
    let mut properties = UserProperties::new(&user.username, &tenant.name);
    properties.status = user.status;
    properties.profile = user.profile.clone();

    let path = template_path("users", tenant, &user.username);
    Template::user(path.to_string_lossy(), properties)
}

/// `<kind>/<tenant>/<name>.yaml`, relative to the templates directory.
fn template_path(kind: &str, tenant: &TenantConfig, name: &str) -> PathBuf {
    PathBuf::from(kind)
        .join(file_stem(&tenant.name))
        .join(format!("{}.yaml", file_stem(name)))
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
