/// Router Module Index
///
/// Routes are split by how they are guarded. Role and ownership checks still
/// happen inside every handler through `policy`; the split only decides whether
/// a request must carry a valid access token at all.

/// Routes reachable without a token (health, registration, login, refresh).
pub mod public;

/// Routes behind the `AuthUser` middleware.
pub mod authenticated;

/// Account administration, nested under `/admin` and also behind the
/// `AuthUser` middleware.
pub mod admin;
