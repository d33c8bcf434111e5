// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for property-based testing.

use proptest::prelude::*;
use syncml_core::{ChangeState, Role, SyncMode};

pub fn mode_strategy() -> impl Strategy<Value = SyncMode> {
    prop::sample::select(SyncMode::ALL.to_vec())
}

pub fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Client), Just(Role::Server)]
}

pub fn change_state_strategy() -> impl Strategy<Value = ChangeState> {
    prop_oneof![
        Just(ChangeState::Added),
        Just(ChangeState::Modified),
        Just(ChangeState::Deleted),
    ]
}

/// Item bodies: short printable text.
pub fn body_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,40}"
}
