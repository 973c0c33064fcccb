use anyhow::{Context, Result};

/// Host-wide singleton lock held for the lifetime of a scheduler run.
///
/// Binding a loopback listener doubles as a mutex between processes: a second
/// instance fails to bind (`AddrInUse`) and must abort before touching any
/// tree. The port never carries data; dropping the guard closes the listener
/// and releases the lock.
#[derive(Debug)]
pub struct SingletonGuard {
    port: u16,
    _listener: tokio::net::TcpListener,
}

impl SingletonGuard {
    /// Acquire-or-die: a failed bind is an immediate error, with no blocking
    /// wait and no timeout.
    pub async fn acquire(port: u16) -> Result<Self> {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
        let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| {
            format!(
                "cannot acquire the lock on port {port} - another rmirror instance appears to be running"
            )
        })?;
        tracing::info!("acquired singleton lock on port {}", port);
        Ok(Self {
            port,
            _listener: listener,
        })
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        // the listener closes with the guard; log the hand-back for operators
        tracing::info!("released singleton lock on port {}", self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() -> Result<()> {
        let guard = SingletonGuard::acquire(45731).await?;
        assert!(SingletonGuard::acquire(45731).await.is_err());
        drop(guard);
        // released lock can be taken again
        let _guard = SingletonGuard::acquire(45731).await?;
        Ok(())
    }
}
