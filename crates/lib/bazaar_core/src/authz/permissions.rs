//! Permission, policy and role names known to the application.

pub const TODO_LISTS_READ: &str = "todo.lists.read";
pub const TODO_LISTS_CREATE: &str = "todo.lists.create";
pub const TODO_LISTS_UPDATE: &str = "todo.lists.update";
pub const TODO_LISTS_DELETE: &str = "todo.lists.delete";

pub const TODO_ITEMS_READ: &str = "todo.items.read";
pub const TODO_ITEMS_CREATE: &str = "todo.items.create";
pub const TODO_ITEMS_UPDATE: &str = "todo.items.update";
pub const TODO_ITEMS_DELETE: &str = "todo.items.delete";

pub const NOTIFICATIONS_SEND: &str = "notifications.send";
pub const USERS_ROLES_MANAGE: &str = "users.roles.manage";

pub const POLICY_USER_MANAGEMENT: &str = "UserManagement";

pub const ROLE_ADMIN: &str = "Admin";
pub const ROLE_USER: &str = "User";

/// Everything the administrator role is granted.
pub const ALL: &[&str] = &[
    TODO_LISTS_READ,
    TODO_LISTS_CREATE,
    TODO_LISTS_UPDATE,
    TODO_LISTS_DELETE,
    TODO_ITEMS_READ,
    TODO_ITEMS_CREATE,
    TODO_ITEMS_UPDATE,
    TODO_ITEMS_DELETE,
    NOTIFICATIONS_SEND,
    USERS_ROLES_MANAGE,
];

/// Granted to ordinary users.
pub const USER_DEFAULT: &[&str] = &[
    TODO_LISTS_READ,
    TODO_LISTS_CREATE,
    TODO_LISTS_UPDATE,
    TODO_LISTS_DELETE,
    TODO_ITEMS_READ,
    TODO_ITEMS_CREATE,
    TODO_ITEMS_UPDATE,
    TODO_ITEMS_DELETE,
];
