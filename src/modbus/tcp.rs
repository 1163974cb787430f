//! Modbus/TCP client backed by tokio-modbus behind a blocking facade.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::{info, warn};
use tokio::runtime::Runtime;
use tokio_modbus::client::{tcp, Context, Reader, Writer};
use tokio_modbus::slave::Slave;

use crate::error::{Error, Result};
use crate::{ClientError, ClientResult, ModbusClient};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UNIT_ID: u8 = 1;

/// [`ModbusClient`] over a TCP session. All calls run on a private
/// current-thread runtime; the driver stays synchronous.
pub struct TcpModbusClient {
    rt: Runtime,
    ctx: Context,
    endpoint: SocketAddr,
}

impl TcpModbusClient {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let connection_error = |message: String| Error::Connection {
            endpoint: format!("{}:{}", host, port),
            message,
        };
        let endpoint = (host, port)
            .to_socket_addrs()
            .map_err(|e| connection_error(e.to_string()))?
            .next()
            .ok_or_else(|| connection_error("no address resolved".into()))?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| connection_error(e.to_string()))?;
        let ctx = open(&rt, endpoint).map_err(connection_error)?;
        info!("Connected to {}", endpoint);
        Ok(TcpModbusClient { rt, ctx, endpoint })
    }
}

fn open(rt: &Runtime, endpoint: SocketAddr) -> std::result::Result<Context, String> {
    rt.block_on(async {
        match tokio::time::timeout(CONNECT_TIMEOUT, tcp::connect_slave(endpoint, Slave(UNIT_ID)))
            .await
        {
            Ok(connected) => connected.map_err(|e| e.to_string()),
            Err(_) => Err("connect timed out".into()),
        }
    })
}

fn transport<E: std::fmt::Display>(err: E) -> ClientError {
    ClientError::Disconnected(err.to_string())
}

fn exception<E: std::fmt::Debug>(err: E) -> ClientError {
    ClientError::Protocol(format!("modbus exception: {:?}", err))
}

impl ModbusClient for TcpModbusClient {
    fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        self.rt
            .block_on(self.ctx.read_coils(address, count))
            .map_err(transport)?
            .map_err(exception)
    }

    fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        self.rt
            .block_on(self.ctx.read_discrete_inputs(address, count))
            .map_err(transport)?
            .map_err(exception)
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        self.rt
            .block_on(self.ctx.read_holding_registers(address, count))
            .map_err(transport)?
            .map_err(exception)
    }

    fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        self.rt
            .block_on(self.ctx.read_input_registers(address, count))
            .map_err(transport)?
            .map_err(exception)
    }

    fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()> {
        self.rt
            .block_on(self.ctx.write_single_coil(address, value))
            .map_err(transport)?
            .map_err(exception)
    }

    fn write_multiple_coils(&mut self, address: u16, values: &[bool]) -> ClientResult<()> {
        self.rt
            .block_on(self.ctx.write_multiple_coils(address, values))
            .map_err(transport)?
            .map_err(exception)
    }

    fn write_single_register(&mut self, address: u16, value: u16) -> ClientResult<()> {
        self.rt
            .block_on(self.ctx.write_single_register(address, value))
            .map_err(transport)?
            .map_err(exception)
    }

    fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> ClientResult<()> {
        self.rt
            .block_on(self.ctx.write_multiple_registers(address, values))
            .map_err(transport)?
            .map_err(exception)
    }

    fn reconnect(&mut self) -> ClientResult<()> {
        warn!("Reconnecting to {}", self.endpoint);
        self.ctx = open(&self.rt, self.endpoint).map_err(ClientError::Disconnected)?;
        Ok(())
    }
}
