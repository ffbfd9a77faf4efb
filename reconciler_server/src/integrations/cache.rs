use redis::{AsyncCommands, RedisError};

/// Prefix of the keys under which the storefront caches per-user views (wallet balance, order list).
pub const USER_CACHE_PREFIX: &str = "user_view:";

pub fn user_cache_key(user_id: i64) -> String {
    format!("{USER_CACHE_PREFIX}{user_id}")
}

/// Drops cached user views from Redis so the next read rebuilds them from the database.
#[derive(Clone)]
pub struct CacheInvalidator {
    client: redis::Client,
}

impl CacheInvalidator {
    pub fn new(redis_url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn invalidate_user(&self, user_id: i64) -> Result<(), RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(user_cache_key(user_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_keys() {
        assert_eq!(user_cache_key(42), "user_view:42");
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(CacheInvalidator::new("not a redis url").is_err());
        assert!(CacheInvalidator::new("redis://127.0.0.1:6379/0").is_ok());
    }
}
