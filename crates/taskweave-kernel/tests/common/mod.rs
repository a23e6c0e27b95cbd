//! Kernel construction helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use taskweave_cas::{Ed25519Signer, Signer};
use taskweave_kernel::{KernelConfig, TaskKernel};
use taskweave_types::{Action, DeviceId, NodePayload, TaskId};

pub fn signer(seed: u8) -> Arc<dyn Signer> {
    Arc::new(Ed25519Signer::from_secret_bytes(&[seed; 32]))
}

pub fn config(device: &str) -> KernelConfig {
    KernelConfig {
        device_id: DeviceId::from(device),
        ..KernelConfig::default()
    }
}

pub async fn memory_kernel(seed: u8, device: &str) -> Arc<TaskKernel> {
    Arc::new(TaskKernel::open(config(device), signer(seed)).await.unwrap())
}

pub fn payload(action: Action, value: Value) -> NodePayload {
    let Value::Object(map) = value else {
        panic!("payload must be an object");
    };
    NodePayload::decode(action, &map).unwrap()
}

pub fn task(id: &str) -> TaskId {
    TaskId::from(id)
}
