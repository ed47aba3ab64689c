use crate::error::{AppError, AppResult};
use crate::models::{NewUser, Role, User};
use crate::security::jwt::{TokenKind, TokenPair, TokenService};
use crate::security::password;
use crate::store::Store;

pub struct UserService;

impl UserService {
    /// Create an account and issue its first token pair.
    pub async fn register(
        store: &dyn Store,
        tokens: &TokenService,
        username: String,
        email: String,
        plain_password: &str,
        role: Role,
    ) -> AppResult<(User, TokenPair)> {
        let password_hash = password::hash_password(plain_password)?;
        let user = store
            .insert_user(NewUser {
                username,
                email,
                password_hash,
                role,
            })
            .await?;
        let pair = tokens.issue_pair(user.id, &user.email, user.role)?;
        Ok((user, pair))
    }

    /// Exchange credentials for a token pair. Unknown email and wrong
    /// password are indistinguishable to the caller.
    pub async fn login(
        store: &dyn Store,
        tokens: &TokenService,
        email: &str,
        plain_password: &str,
    ) -> AppResult<(User, TokenPair)> {
        let user = store
            .user_by_email(email)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if !password::verify_password(plain_password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }
        let pair = tokens.issue_pair(user.id, &user.email, user.role)?;
        Ok((user, pair))
    }

    /// Mint a fresh pair from a refresh token. The account must still exist;
    /// claims alone do not prove that.
    pub async fn refresh(
        store: &dyn Store,
        tokens: &TokenService,
        refresh_token: &str,
    ) -> AppResult<TokenPair> {
        let claims = tokens.verify(refresh_token, TokenKind::Refresh)?;
        let user = store
            .user_by_id(claims.user_id()?)
            .await?
            .ok_or(AppError::Unauthorized)?;
        tokens.issue_pair(user.id, &user.email, user.role)
    }
}
