//! Authentication and authorization module
//!
//! - `jwt`: token codec, one per token class (access / refresh)
//! - `tokens`: token service (issue, extract, validate, refresh)
//! - `policy`: route-to-role registration table
//! - `middleware`: role authorization interceptor
//! - `pin`: Argon2id hashing of customer auth PINs
//! - `service`: customer registration, login, refresh and update flows

pub mod jwt;
pub mod middleware;
pub mod pin;
pub mod policy;
pub mod service;
pub mod tokens;

pub use jwt::{Claims, JwtError, TokenCodec, TokenKind};
pub use middleware::{authorize_at, authorize_request, bearer_token, AuthError, AuthenticatedCustomer};
pub use pin::{hash_pin, validate_pin, verify_pin, PinError, PinHashConfig};
pub use policy::{AccessPolicy, Requirement};
pub use service::{
    AuthService, AuthenticateRequest, AuthenticateResponse, RefreshRequest, RefreshResponse,
    RegisterRequest, RegisterResponse, UpdateCustomerRequest,
};
pub use tokens::{RefreshError, RefreshOutcome, TokenPair, TokenService};
