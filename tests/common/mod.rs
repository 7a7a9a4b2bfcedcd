#![allow(dead_code)]

use hc_smartthings::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

/// In-memory SmartThings cloud.
pub struct FakeApi {
    devices: Mutex<SmartThingsResult<Vec<DeviceDescription>>>,
    statuses: Mutex<HashMap<DeviceId, SmartThingsResult<DeviceStatusPayload>>>,
    command_result: Mutex<SmartThingsResult<()>>,
    commands: Mutex<Vec<(DeviceId, DeviceCommand)>>,
    list_calls: AtomicUsize,
    stalled: AtomicBool,
}

impl FakeApi {
    pub fn new(devices: Vec<(DeviceDescription, DeviceStatusPayload)>) -> Self {
        let statuses = devices
            .iter()
            .map(|(d, s)| (d.device_id.clone(), Ok(s.clone())))
            .collect();
        Self {
            devices: Mutex::new(Ok(devices.into_iter().map(|(d, _)| d).collect())),
            statuses: Mutex::new(statuses),
            command_result: Mutex::new(Ok(())),
            commands: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
        }
    }

    pub fn fail_listing(&self, err: SmartThingsError) {
        *self.devices.lock().unwrap() = Err(err);
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescription>) {
        *self.devices.lock().unwrap() = Ok(devices);
    }

    pub fn set_status(&self, id: &str, status: SmartThingsResult<DeviceStatusPayload>) {
        self.statuses.lock().unwrap().insert(id.into(), status);
    }

    pub fn set_command_result(&self, result: SmartThingsResult<()>) {
        *self.command_result.lock().unwrap() = result;
    }

    pub fn sent_commands(&self) -> Vec<(DeviceId, DeviceCommand)> {
        self.commands.lock().unwrap().clone()
    }

    /// Make every call hang until `stall(false)`.
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    async fn maybe_stall(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl SmartThingsApi for FakeApi {
    async fn list_devices(&self, session: &Session) -> SmartThingsResult<Vec<DeviceDescription>> {
        session.ensure_open()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        self.devices.lock().unwrap().clone()
    }

    async fn device_status(
        &self,
        _session: &Session,
        device_id: &DeviceId,
    ) -> SmartThingsResult<DeviceStatusPayload> {
        self.maybe_stall().await;
        self.statuses
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| Err(SmartThingsError::UnknownDevice(device_id.clone())))
    }

    async fn execute_command(
        &self,
        _session: &Session,
        device_id: &DeviceId,
        command: &DeviceCommand,
    ) -> SmartThingsResult<()> {
        self.maybe_stall().await;
        self.commands
            .lock()
            .unwrap()
            .push((device_id.clone(), command.clone()));
        self.command_result.lock().unwrap().clone()
    }
}

pub fn plug(state: &str) -> (DeviceDescription, DeviceStatusPayload) {
    (
        DeviceDescription::new("plug", "Plug").component("main", ["switch", "refresh"]),
        DeviceStatusPayload::new().with_value("main", "switch", "switch", state),
    )
}

pub fn sensor() -> (DeviceDescription, DeviceStatusPayload) {
    (
        DeviceDescription::new("sensor", "Hall").component(
            "main",
            ["motionSensor", "temperatureMeasurement", "custom.vendorThing"],
        ),
        DeviceStatusPayload::new()
            .with_value("main", "motionSensor", "motion", "inactive")
            .with_value("main", "temperatureMeasurement", "temperature", 20.5)
            .with_value("main", "custom.vendorThing", "x", 1),
    )
}
