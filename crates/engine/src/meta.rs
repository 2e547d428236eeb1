// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known `JobNode::metadata` keys (`§3`: "includes `step_name`,
//! `step_id`, `manager_id`, `phase`, `step_stats`, `step_job_ids`,
//! `document_count`, `status_report`"). Centralized here so the job
//! manager, dispatcher, and step manager agree on the wire shape without
//! re-stringifying the same literals at every call site.

pub const STEP_NAME: &str = "step_name";
pub const STEP_ID: &str = "step_id";
pub const STEP_INDEX: &str = "step_index";
pub const STEP_TYPE: &str = "step_type";
pub const DESCRIPTION: &str = "description";
pub const JOB_DEFINITION_ID: &str = "job_definition_id";
pub const AUTH_ID: &str = "auth_id";
pub const MANAGER_ID: &str = "manager_id";
pub const CURRENT_STEP_NAME: &str = "current_step_name";
pub const CURRENT_STEP_ID: &str = "current_step_id";
pub const CURRENT_STEP_STATUS: &str = "current_step_status";
pub const STEP_STATS: &str = "step_stats";
pub const STEP_JOB_IDS: &str = "step_job_ids";
pub const DOCUMENT_COUNT: &str = "document_count";
pub const STATUS_REPORT: &str = "status_report";
pub const ERROR_TOLERANCE_FAILURES: &str = "error_tolerance_failures";
pub const LAST_VALIDATION_ERROR: &str = "last_validation_error";
pub const FAILED_STEPS: &str = "failed_steps";
pub const SKIP_REASON: &str = "skip_reason";
