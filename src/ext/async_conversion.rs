/// Fallible conversion that has to await I/O, such as loading a config file
/// or a persisted baseline from a path.
///
/// # Examples
///
/// ```rust,ignore
/// let config = WatchConfig::async_try_from(Path::new("pollwatch.yaml")).await?;
/// ```
#[allow(async_fn_in_trait)]
pub trait AsyncTryFrom<T>: Sized {
    type Error;

    async fn async_try_from(value: T) -> Result<Self, Self::Error>;
}

/// Mirror of [`AsyncTryFrom`], implemented for every `T` whose target
/// implements `AsyncTryFrom<T>`.
#[allow(async_fn_in_trait)]
pub trait AsyncTryInto<T> {
    type Error;

    async fn async_try_into(self) -> Result<T, Self::Error>;
}

impl<T, U> AsyncTryInto<U> for T
where
    U: AsyncTryFrom<T>,
{
    type Error = U::Error;

    async fn async_try_into(self) -> Result<U, Self::Error> {
        U::async_try_from(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IntervalMillis(u64);

    impl AsyncTryFrom<&str> for IntervalMillis {
        type Error = std::num::ParseIntError;

        async fn async_try_from(value: &str) -> Result<Self, Self::Error> {
            Ok(IntervalMillis(value.trim().parse()?))
        }
    }

    #[test]
    fn async_try_from_parses() {
        futures::executor::block_on(async {
            let interval = IntervalMillis::async_try_from(" 250 ").await.unwrap();
            assert_eq!(interval.0, 250);
        });
    }

    #[test]
    fn async_try_into_forwards_errors() {
        futures::executor::block_on(async {
            let result: Result<IntervalMillis, _> = "soon".async_try_into().await;
            assert!(result.is_err());
        });
    }
}
