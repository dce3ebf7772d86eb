// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::LazyLock;

use prometheus::{
    IntCounter, IntCounterVec, IntGauge, register_int_counter, register_int_counter_vec,
    register_int_gauge,
};

pub const COMMAND_LABEL: &str = "command";
pub const STATUS_LABEL: &str = "status";

pub static CONNECTIONS_ACCEPTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "redqueue_connections_accepted_total",
        "Total number of client connections accepted"
    )
    .unwrap()
});

pub static CONNECTIONS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "redqueue_connections_active",
        "Number of client sessions currently open"
    )
    .unwrap()
});

pub static COMMANDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "redqueue_commands_total",
        "Total number of commands executed",
        &[COMMAND_LABEL]
    )
    .unwrap()
});

pub static ERROR_REPLIES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "redqueue_error_replies_total",
        "Total number of error replies sent, by status code",
        &[STATUS_LABEL]
    )
    .unwrap()
});
