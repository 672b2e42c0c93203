use tokio::io::{AsyncRead, AsyncWrite};

pub mod apis;
pub mod client;
pub mod config_dir;
pub mod kube_types;
pub mod pod_template;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::create_client;

/// Copy data between two peers
/// Using 2 different generators, because they could be different structs with same traits.
pub async fn transfer<I, O>(mut inbound: I, mut outbound: O) -> anyhow::Result<()>
where
    I: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        Ok(res) => log::info!("transfer closed ({}, {})", res.0, res.1),
        Err(err) => log::error!("transfer error: {:?}", err),
    };

    Ok(())
}
