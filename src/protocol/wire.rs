//! Colon-delimited text codec for `Content`
//!
//! `KEYWORD:field:LABEL:value:...`. Loads are written with one decimal,
//! proposal scores with two. Trailing fields a decoder does not know about are
//! ignored, so older senders that append extra tokens still parse.

use std::str::FromStr;
use thiserror::Error;

use crate::domain::{Conflict, SiteStatus};

use super::message::{Content, PriorityLevel};

/// Why a text message could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("{kind}: missing field `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("{kind}: invalid {field} `{value}`")]
    InvalidField {
        kind: String,
        field: &'static str,
        value: String,
    },

    #[error("{kind}: expected `{expected}`, found `{found}`")]
    UnexpectedLabel {
        kind: String,
        expected: &'static str,
        found: String,
    },
}

type DecodeResult<T> = std::result::Result<T, ProtocolError>;

impl Content {
    /// Render the wire form.
    ///
    /// Loads, ETAs and energy are written with one decimal and proposal
    /// scores with two, so decoding returns the value rounded to that
    /// precision.
    pub fn encode(&self) -> String {
        match self {
            Content::Register {
                unit,
                unit_type,
                capacity,
                operational,
            } => format!("REGISTER:{unit}:{unit_type}:{capacity}:{operational}"),
            Content::UnitRegistered { unit, site } => format!("REGISTERED:{unit}:SITE:{site}"),
            Content::StatusUpdate {
                unit,
                load,
                queue,
                operational,
            } => format!("STATUS_UPDATE:{unit}:LOAD:{load:.1}:QUEUE:{queue}:OPERATIONAL:{operational}"),
            Content::TaskCompleted { task_id, unit } => format!("TASK_COMPLETED:{task_id}:{unit}"),
            Content::Failure { unit, error_code } => format!("FAILURE:{unit}:{error_code}"),
            Content::Recovery { unit, detail } => format!("RECOVERY:{unit}:{detail}"),
            Content::Overload { unit, load } => format!("OVERLOAD:{unit}:{load:.1}"),
            Content::LoadBalancing { unit, load, queue } => {
                format!("LOAD_BALANCING:{unit}:{load:.1}:{queue}")
            }
            Content::TransferTasks { to, count } => format!("TRANSFER_TASKS:{to}:{count}"),
            Content::IncomingTasks { from, count } => format!("INCOMING_TASKS:{from}:{count}"),
            Content::Task { task_id, priority } => format!("TASK:{task_id}:{priority}"),
            Content::Accepted { task_id, eta_secs } => format!("ACCEPTED:{task_id}:ETA:{eta_secs:.1}"),
            Content::Refused {
                task_id,
                reason,
                load,
            } => format!("REFUSED:{task_id}:{reason}:LOAD:{load:.1}"),
            Content::CallForProposal {
                task_id,
                requirements,
            } => format!("CFP:{task_id}:REQUIREMENTS:{requirements}"),
            Content::Proposal {
                task_id,
                score,
                eta_secs,
                energy,
            } => format!("PROPOSAL:{task_id}:SCORE:{score:.2}:ETA:{eta_secs:.1}:ENERGY:{energy:.1}"),
            Content::Awarded { task_id } => format!("AWARDED:{task_id}"),
            Content::Declined { task_id } => format!("DECLINED:{task_id}"),
            Content::Ping {
                unit,
                load,
                queue,
                site,
            } => format!("PING:{unit}:LOAD:{load:.1}:QUEUE:{queue}:SITE:{site}"),
            Content::Pong {
                unit,
                load,
                operational,
                spare_capacity,
                site,
            } => format!(
                "PONG:{unit}:LOAD:{load:.1}:STATUS:{operational}:CAPACITY:{spare_capacity}:SITE:{site}"
            ),
            Content::HelpOffer {
                unit,
                spare_capacity,
            } => format!("HELP_OFFER:{unit}:CAPACITY:{spare_capacity}"),
            Content::HelpReply { unit, needs_help } => format!("HELP_REPLY:{unit}:{needs_help}"),
            Content::RegisterSite { site } => format!("REGISTER_SITE:{site}"),
            Content::SiteRegistered { site } => {
                format!("REGISTERED:{site}:SUPERVISOR_ACKNOWLEDGED")
            }
            Content::SiteStatus(status) => format!(
                "SITE_STATUS:{}:LOAD:{:.1}:MACHINES:{}:OPERATIONAL:{}:FAILURES:{}:TASKS:{}",
                status.site_id,
                status.load_average,
                status.total_units,
                status.operational_units,
                status.failures,
                status.completed_tasks
            ),
            Content::Escalation {
                site,
                issue,
                unit,
                severity,
            } => format!("ESCALATION:{site}:{issue}:{unit}:{severity}"),
            Content::Directive {
                action,
                unit,
                description,
            } => format!("SUPERVISOR_DIRECTIVE:{action}:{unit}:{description}"),
            Content::AcceptLoad {
                from_site,
                priority,
            } => format!("ACCEPT_LOAD:FROM:{from_site}:PRIORITY:{priority}"),
            Content::TransferResource {
                resource,
                amount,
                to_site,
            } => format!("TRANSFER_RESOURCE:{resource}:{amount}:TO:{to_site}"),
            Content::IncomingResource {
                resource,
                amount,
                from_site,
            } => format!("INCOMING_RESOURCE:{resource}:{amount}:FROM:{from_site}"),
            Content::ResourceRequest {
                site,
                unit,
                resource,
                amount,
            } => format!("INTER_SITE_RESOURCE:{site}:{unit}:{resource}:{amount}"),
            Content::ResourceGranted { resource, amount } => {
                format!("RESOURCE_GRANTED:{resource}:{amount}:SOURCE:GLOBAL_POOL")
            }
            Content::ResourceUnavailable { resource } => format!("RESOURCE_UNAVAILABLE:{resource}"),
            Content::ResourceRelease {
                site,
                resource,
                amount,
            } => format!("RESOURCE_RELEASE:{site}:{resource}:{amount}"),
            Content::ConflictReport(conflict) => match &conflict.resource {
                Some(resource) => format!(
                    "CONFLICT_INTER_SITE:{}:{}:{}:{}",
                    conflict.kind, conflict.site_1, conflict.site_2, resource
                ),
                None => format!(
                    "CONFLICT_INTER_SITE:{}:{}:{}",
                    conflict.kind, conflict.site_1, conflict.site_2
                ),
            },
            Content::ResourcePriority {
                level,
                resource,
                defer,
            } => {
                if *defer {
                    format!("RESOURCE_PRIORITY:{level}:{resource}:DEFER")
                } else {
                    format!("RESOURCE_PRIORITY:{level}:{resource}")
                }
            }
            Content::InterSiteTask { task_id, priority } => {
                format!("INTER_SITE_TASK:{task_id}:PRIORITY:{priority}")
            }
            Content::TransportRequest {
                from,
                to,
                product,
                priority,
            } => format!("TRANSPORT_REQUEST:{from}:{to}:{product}:{priority}"),
            Content::TransportAccepted { product, eta_secs } => {
                format!("TRANSPORT_ACCEPTED:{product}:ESTIMATED_TIME:{eta_secs}s")
            }
            Content::TransportRefused { product, reason } => {
                format!("TRANSPORT_REFUSED:{product}:{reason}")
            }
        }
    }

    /// Parse the wire form
    pub fn decode(text: &str) -> DecodeResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut parts = text.split(':');
        let keyword = parts.next().unwrap_or_default().trim().to_ascii_uppercase();
        let mut f = Fields {
            kind: keyword.clone(),
            parts: parts.collect(),
            pos: 0,
        };

        let content = match keyword.as_str() {
            "REGISTER" => Content::Register {
                unit: f.text("unit")?,
                unit_type: f.parse("unit_type")?,
                capacity: f.parse("capacity")?,
                operational: f.flag("operational")?,
            },
            "REGISTERED" => {
                let name = f.text("name")?;
                match f.text("scope")?.to_ascii_uppercase().as_str() {
                    "SITE" => Content::UnitRegistered {
                        unit: name,
                        site: f.text("site")?,
                    },
                    "SUPERVISOR_ACKNOWLEDGED" => Content::SiteRegistered { site: name },
                    other => {
                        return Err(ProtocolError::InvalidField {
                            kind: f.kind.clone(),
                            field: "scope",
                            value: other.to_string(),
                        })
                    }
                }
            }
            "STATUS_UPDATE" => Content::StatusUpdate {
                unit: f.text("unit")?,
                load: f.labeled_number("LOAD")?,
                queue: f.labeled("QUEUE")?,
                operational: {
                    f.label("OPERATIONAL")?;
                    f.flag("operational")?
                },
            },
            "TASK_COMPLETED" => Content::TaskCompleted {
                task_id: f.text("task_id")?,
                unit: f.text("unit")?,
            },
            "FAILURE" => Content::Failure {
                unit: f.text("unit")?,
                error_code: f.rest("error_code")?,
            },
            "RECOVERY" => Content::Recovery {
                unit: f.text("unit")?,
                detail: f.rest("detail")?,
            },
            "OVERLOAD" => Content::Overload {
                unit: f.text("unit")?,
                load: f.number("load")?,
            },
            "LOAD_BALANCING" => Content::LoadBalancing {
                unit: f.text("unit")?,
                load: f.number("load")?,
                queue: f.parse("queue")?,
            },
            "TRANSFER_TASKS" => Content::TransferTasks {
                to: f.text("to")?,
                count: f.parse("count")?,
            },
            "INCOMING_TASKS" => Content::IncomingTasks {
                from: f.text("from")?,
                count: f.parse("count")?,
            },
            "TASK" => Content::Task {
                task_id: f.text("task_id")?,
                priority: f.parse("priority")?,
            },
            "ACCEPTED" => Content::Accepted {
                task_id: f.text("task_id")?,
                eta_secs: f.labeled_number("ETA")?,
            },
            "REFUSED" => Content::Refused {
                task_id: f.text("task_id")?,
                reason: f.parse("reason")?,
                load: f.labeled_number("LOAD")?,
            },
            "CFP" => Content::CallForProposal {
                task_id: f.text("task_id")?,
                requirements: {
                    f.label("REQUIREMENTS")?;
                    f.rest("requirements")?
                },
            },
            "PROPOSAL" => Content::Proposal {
                task_id: f.text("task_id")?,
                score: f.labeled_number("SCORE")?,
                eta_secs: f.labeled_number("ETA")?,
                energy: f.labeled_number("ENERGY")?,
            },
            "AWARDED" => Content::Awarded {
                task_id: f.text("task_id")?,
            },
            "DECLINED" => Content::Declined {
                task_id: f.text("task_id")?,
            },
            "PING" => Content::Ping {
                unit: f.text("unit")?,
                load: f.labeled_number("LOAD")?,
                queue: f.labeled("QUEUE")?,
                site: {
                    f.label("SITE")?;
                    f.text("site")?
                },
            },
            "PONG" => Content::Pong {
                unit: f.text("unit")?,
                load: f.labeled_number("LOAD")?,
                operational: {
                    f.label("STATUS")?;
                    f.flag("status")?
                },
                spare_capacity: f.labeled("CAPACITY")?,
                site: {
                    f.label("SITE")?;
                    f.text("site")?
                },
            },
            "HELP_OFFER" => Content::HelpOffer {
                unit: f.text("unit")?,
                spare_capacity: f.labeled("CAPACITY")?,
            },
            "HELP_REPLY" => Content::HelpReply {
                unit: f.text("unit")?,
                needs_help: f.flag("needs_help")?,
            },
            "REGISTER_SITE" => Content::RegisterSite {
                site: f.text("site")?,
            },
            "SITE_STATUS" => Content::SiteStatus(SiteStatus {
                site_id: f.text("site")?,
                load_average: f.labeled_number("LOAD")?,
                total_units: f.labeled("MACHINES")?,
                operational_units: f.labeled("OPERATIONAL")?,
                failures: f.labeled("FAILURES")?,
                completed_tasks: f.labeled("TASKS")?,
            }),
            "ESCALATION" => Content::Escalation {
                site: f.text("site")?,
                issue: f.parse("issue")?,
                unit: f.text("unit")?,
                severity: f.parse("severity")?,
            },
            "SUPERVISOR_DIRECTIVE" => Content::Directive {
                action: f.parse("action")?,
                unit: f.text("unit")?,
                description: f.rest_or_empty(),
            },
            "ACCEPT_LOAD" => Content::AcceptLoad {
                from_site: {
                    f.label("FROM")?;
                    f.text("from_site")?
                },
                priority: match f.peek() {
                    Some(_) => f.labeled("PRIORITY")?,
                    None => PriorityLevel::High,
                },
            },
            "TRANSFER_RESOURCE" => Content::TransferResource {
                resource: f.text("resource")?,
                amount: f.parse("amount")?,
                to_site: {
                    f.label("TO")?;
                    f.text("to_site")?
                },
            },
            "INCOMING_RESOURCE" => Content::IncomingResource {
                resource: f.text("resource")?,
                amount: f.parse("amount")?,
                from_site: {
                    f.label("FROM")?;
                    f.text("from_site")?
                },
            },
            "INTER_SITE_RESOURCE" => Content::ResourceRequest {
                site: f.text("site")?,
                unit: f.text("unit")?,
                resource: f.text("resource")?,
                amount: f.parse("amount")?,
            },
            "RESOURCE_GRANTED" => Content::ResourceGranted {
                resource: f.text("resource")?,
                amount: f.parse("amount")?,
            },
            "RESOURCE_UNAVAILABLE" => Content::ResourceUnavailable {
                resource: f.text("resource")?,
            },
            "RESOURCE_RELEASE" => Content::ResourceRelease {
                site: f.text("site")?,
                resource: f.text("resource")?,
                amount: f.parse("amount")?,
            },
            "CONFLICT_INTER_SITE" => Content::ConflictReport(Conflict {
                kind: f.parse("kind")?,
                site_1: f.text("site_1")?,
                site_2: f.text("site_2")?,
                resource: f.optional_text(),
            }),
            "RESOURCE_PRIORITY" => Content::ResourcePriority {
                level: f.parse("level")?,
                resource: f.text("resource")?,
                defer: f
                    .optional_text()
                    .map(|token| token.eq_ignore_ascii_case("DEFER"))
                    .unwrap_or(false),
            },
            "INTER_SITE_TASK" => Content::InterSiteTask {
                task_id: f.text("task_id")?,
                priority: match f.peek() {
                    Some(_) => f.labeled("PRIORITY")?,
                    None => DEFAULT_INTER_SITE_PRIORITY,
                },
            },
            "TRANSPORT_REQUEST" => Content::TransportRequest {
                from: f.text("from")?,
                to: f.text("to")?,
                product: f.text("product")?,
                priority: f.parse("priority")?,
            },
            "TRANSPORT_ACCEPTED" => Content::TransportAccepted {
                product: f.text("product")?,
                eta_secs: {
                    f.label("ESTIMATED_TIME")?;
                    let raw = f.text("estimated_time")?;
                    let digits = raw.trim_end_matches(['s', 'S']);
                    digits.parse().map_err(|_| ProtocolError::InvalidField {
                        kind: f.kind.clone(),
                        field: "estimated_time",
                        value: raw.clone(),
                    })?
                },
            },
            "TRANSPORT_REFUSED" => Content::TransportRefused {
                product: f.text("product")?,
                reason: f.rest("reason")?,
            },
            _ => return Err(ProtocolError::UnknownKind(f.kind.clone())),
        };

        Ok(content)
    }
}

impl FromStr for Content {
    type Err = ProtocolError;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        Content::decode(text)
    }
}

/// Priority given to forwarded work whose sender omitted one
pub const DEFAULT_INTER_SITE_PRIORITY: u8 = 8;

/// Cursor over the colon-separated fields after the keyword
struct Fields<'a> {
    kind: String,
    parts: Vec<&'a str>,
    pos: usize,
}

impl<'a> Fields<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.parts.get(self.pos).copied().map(str::trim)
    }

    fn next_raw(&mut self, field: &'static str) -> DecodeResult<&'a str> {
        match self.peek() {
            Some(part) if !part.is_empty() => {
                self.pos += 1;
                Ok(part)
            }
            _ => Err(ProtocolError::MissingField {
                kind: self.kind.clone(),
                field,
            }),
        }
    }

    fn text(&mut self, field: &'static str) -> DecodeResult<String> {
        self.next_raw(field).map(str::to_string)
    }

    fn optional_text(&mut self) -> Option<String> {
        let token = self.peek().filter(|t| !t.is_empty())?;
        self.pos += 1;
        Some(token.to_string())
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> DecodeResult<T> {
        let raw = self.next_raw(field)?;
        raw.parse().map_err(|_| ProtocolError::InvalidField {
            kind: self.kind.clone(),
            field,
            value: raw.to_string(),
        })
    }

    fn number(&mut self, field: &'static str) -> DecodeResult<f64> {
        let value: f64 = self.parse(field)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ProtocolError::InvalidField {
                kind: self.kind.clone(),
                field,
                value: value.to_string(),
            })
        }
    }

    fn flag(&mut self, field: &'static str) -> DecodeResult<bool> {
        let raw = self.next_raw(field)?;
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ProtocolError::InvalidField {
                kind: self.kind.clone(),
                field,
                value: raw.to_string(),
            }),
        }
    }

    fn label(&mut self, expected: &'static str) -> DecodeResult<()> {
        let found = self.next_raw(expected)?;
        if found.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedLabel {
                kind: self.kind.clone(),
                expected,
                found: found.to_string(),
            })
        }
    }

    /// `LABEL:value`
    fn labeled<T: FromStr>(&mut self, label: &'static str) -> DecodeResult<T> {
        self.label(label)?;
        self.parse(label)
    }

    fn labeled_number(&mut self, label: &'static str) -> DecodeResult<f64> {
        self.label(label)?;
        self.number(label)
    }

    /// Everything left, rejoined with ':'; must be non-empty
    fn rest(&mut self, field: &'static str) -> DecodeResult<String> {
        let rest = self.rest_or_empty();
        if rest.is_empty() {
            Err(ProtocolError::MissingField {
                kind: self.kind.clone(),
                field,
            })
        } else {
            Ok(rest)
        }
    }

    fn rest_or_empty(&mut self) -> String {
        let rest = self.parts[self.pos.min(self.parts.len())..].join(":");
        self.pos = self.parts.len();
        rest.trim().to_string()
    }
}
