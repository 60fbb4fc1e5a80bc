//! OS device-permission seam.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionType {
    Microphone,
    Camera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    /// Not granted yet, but the OS will show a prompt if asked.
    CanRequest,
    Denied,
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn status(&self, permission: PermissionType) -> PermissionStatus;
    async fn request(&self, permission: PermissionType) -> PermissionStatus;
    fn open_system_settings(&self, permission: PermissionType);
}

/// Provider for platforms without a permission model.
pub struct GrantedPermissions;

#[async_trait]
impl PermissionProvider for GrantedPermissions {
    fn status(&self, _permission: PermissionType) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request(&self, _permission: PermissionType) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn open_system_settings(&self, _permission: PermissionType) {}
}
