/// Router Module Index
///
/// Routes are grouped by the authentication they require; the router assembly in
/// `create_router` applies the auth layer per group.

/// Routes open to anonymous callers: registration, login and the public listing.
pub mod public;

/// Routes behind the `AuthUser` middleware.
pub mod authenticated;

/// Moderation routes, nested under `/travel-notes/admin`. Authenticated like the group
/// above; the reviewer/admin role is enforced by the access policy in each handler.
pub mod admin;
