// 认证模块
// 密码哈希、令牌签发以及访问控制

pub mod gate;
pub mod password;
pub mod token;

pub use gate::{AuthError, AuthGate, bearer_token, ensure_role};
pub use password::{HashScheme, MAX_PASSWORD_BYTES, hash_password, verify_password};
pub use token::{Claims, TokenError, TokenKind, TokenPair, TokenService};
