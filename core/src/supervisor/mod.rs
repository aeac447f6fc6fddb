//! Client for the local supervisor daemon: process inventory, bulk
//! stop/start, and the shutdown call the self-destruct timer fires.

mod transport;
mod xmlrpc;

use async_trait::async_trait;
use sandboxd_protocol::ProcessInfo;
use sandboxd_protocol::SupervisorActionResult;
use tracing::error;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::error::SandboxErr;
use crate::timeout::ShutdownHook;
use transport::UnixRpcTransport;

pub struct SupervisorBridge {
    transport: UnixRpcTransport,
}

impl SupervisorBridge {
    pub fn new(config: &Config) -> Self {
        Self {
            transport: UnixRpcTransport::new(&config.supervisor_socket_path),
        }
    }

    pub async fn get_all_processes(&self) -> Result<Vec<ProcessInfo>> {
        let value = self.call("supervisor.getAllProcessInfo").await?;
        serde_json::from_value(value).map_err(|err| {
            error!(error = %err, "unexpected process info payload");
            SandboxErr::bad_request(format!("unexpected process info payload: {err}"))
        })
    }

    pub async fn stop_all_processes(&self) -> Result<SupervisorActionResult> {
        let result = self.call("supervisor.stopAllProcesses").await?;
        info!("stopped all supervised processes");
        Ok(SupervisorActionResult {
            result: Some(result),
            ..SupervisorActionResult::with_status("stopped")
        })
    }

    pub async fn start_all_processes(&self) -> Result<SupervisorActionResult> {
        let result = self.call("supervisor.startAllProcesses").await?;
        info!("started all supervised processes");
        Ok(SupervisorActionResult {
            result: Some(result),
            ..SupervisorActionResult::with_status("started")
        })
    }

    /// Bulk stop followed by bulk start of every supervised process.
    pub async fn restart(&self) -> Result<SupervisorActionResult> {
        let stop_result = self.call("supervisor.stopAllProcesses").await?;
        let start_result = self.call("supervisor.startAllProcesses").await?;
        info!("restarted all supervised processes");
        Ok(SupervisorActionResult {
            stop_result: Some(stop_result),
            start_result: Some(start_result),
            ..SupervisorActionResult::with_status("restarted")
        })
    }

    /// Asks the daemon to shut itself down, taking the whole sandbox with it.
    pub async fn shutdown(&self) -> Result<SupervisorActionResult> {
        let shutdown_result = self.call("supervisor.shutdown").await?;
        info!("requested supervisor shutdown");
        Ok(SupervisorActionResult {
            shutdown_result: Some(shutdown_result),
            ..SupervisorActionResult::with_status("shutdown")
        })
    }

    /// Transport and remote failures both surface as `BadRequest` with the
    /// underlying message attached.
    async fn call(&self, method: &str) -> Result<serde_json::Value> {
        let body = xmlrpc::encode_call(method, &[]);
        let response = self.transport.post(&body).await.map_err(|err| {
            error!(method, error = %err, "supervisor RPC transport failed");
            SandboxErr::bad_request(format!("supervisor RPC call failed: {err}"))
        })?;
        let value = xmlrpc::parse_response(&response).map_err(|err| {
            error!(method, error = %err, "supervisor RPC call rejected");
            SandboxErr::bad_request(format!("supervisor RPC call failed: {err}"))
        })?;
        Ok(value.into())
    }
}

#[async_trait]
impl ShutdownHook for SupervisorBridge {
    async fn shutdown(&self) -> Result<()> {
        SupervisorBridge::shutdown(self).await.map(|_| ())
    }
}
