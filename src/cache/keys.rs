//! Cache key formats.
//!
//! Every key here is part of the contract with peer processes (SDK group
//! caches, event consumers); changing one is a breaking change requiring a
//! coordinated reload.

/// Per-user session snapshot hash; fields are biz ids.
pub fn session(user_id: i64) -> String {
    format!("permission:session:{user_id}")
}

pub fn abac_subject_attrs(biz_id: i64, subject_id: i64) -> String {
    format!("abac:attr:subject:{biz_id}:{subject_id}")
}

pub fn abac_resource_attrs(biz_id: i64, resource_id: i64) -> String {
    format!("abac:attr:resource:{biz_id}:{resource_id}")
}

pub fn abac_environment_attrs(biz_id: i64) -> String {
    format!("abac:attr:env:{biz_id}")
}

pub fn abac_definitions(biz_id: i64) -> String {
    format!("abac:def:{biz_id}")
}

pub fn abac_policies(biz_id: i64) -> String {
    format!("abac:policy:{biz_id}")
}

/// Namespace prefix for the multi-cluster replication cache.
pub const MULTICLUSTER_PREFIX: &str = "permission-platform:multicluster:";

pub fn multicluster(key: &str) -> String {
    format!("{MULTICLUSTER_PREFIX}{key}")
}

/// SDK per-user snapshot key, reversed by the group cache.
pub fn client_user_permissions(biz_id: i64, user_id: i64) -> String {
    format!("client:userpermissions:bizId:{biz_id}:userId:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_are_stable() {
        assert_eq!(session(7), "permission:session:7");
        assert_eq!(abac_subject_attrs(1, 2), "abac:attr:subject:1:2");
        assert_eq!(abac_resource_attrs(1, 2), "abac:attr:resource:1:2");
        assert_eq!(abac_environment_attrs(9), "abac:attr:env:9");
        assert_eq!(abac_definitions(9), "abac:def:9");
        assert_eq!(abac_policies(9), "abac:policy:9");
        assert_eq!(multicluster("k"), "permission-platform:multicluster:k");
        assert_eq!(
            client_user_permissions(10, 1001),
            "client:userpermissions:bizId:10:userId:1001"
        );
    }
}
