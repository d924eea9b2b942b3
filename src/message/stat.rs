//! Register-Stat and Report-Stat: real-time telemetry carried on the stat
//! channel.

use bytes::Bytes;

use crate::codec::{tag::Tag, Element};
use crate::stats::TrackerSnapshot;

use super::job::JobId;
use super::{child, child_integer, child_string, Error};

/// Announces a tracker exists for a `(job, client, thread, displayName)`
/// tuple before any Report-Stat for it is sent, so the coordinator can
/// preallocate an aggregation slot. Deduplicated per connection by the
/// sender.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterStat {
    pub job_id: JobId,
    pub client_id: String,
    pub thread_id: u32,
    pub display_name: String,
    pub tracker_kind: i64,
}

impl RegisterStat {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::REGISTER_STAT,
            vec![
                Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())),
                Element::OctetString(Bytes::from(self.client_id.clone().into_bytes())),
                Element::Integer(self.thread_id as i64),
                Element::OctetString(Bytes::from(self.display_name.clone().into_bytes())),
                Element::Integer(self.tracker_kind),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 5 {
            return Err(Error::WrongArity { expected_one_of: &[5], got: children.len() });
        }
        Ok(RegisterStat {
            job_id: JobId(child_string(children, 0, "jobID")?),
            client_id: child_string(children, 1, "clientID")?,
            thread_id: super::child_u32(children, 2, "threadID")?,
            display_name: child_string(children, 3, "displayName")?,
            tracker_kind: child_integer(children, 4, "trackerKind")?,
        })
    }
}

/// One interval's worth of a single tracker's data, fire-and-forget:
/// delivery is best-effort and never blocks the job.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportStat {
    pub job_id: JobId,
    pub snapshot: TrackerSnapshot,
}

impl ReportStat {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::REPORT_STAT,
            vec![
                Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())),
                self.snapshot.encode(),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 2 {
            return Err(Error::WrongArity { expected_one_of: &[2], got: children.len() });
        }
        let snapshot = TrackerSnapshot::decode(child(children, 1, "snapshot")?).map_err(|err| Error::InvalidField {
            field: "snapshot",
            reason: err.to_string(),
        })?;
        Ok(ReportStat { job_id: JobId(child_string(children, 0, "jobID")?), snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::TrackerKind;

    #[test]
    fn register_stat_round_trip() {
        let msg = RegisterStat {
            job_id: JobId("J1".into()),
            client_id: "worker-1".into(),
            thread_id: 3,
            display_name: "ops".into(),
            tracker_kind: TrackerKind::Integer.to_i64(),
        };
        let el = msg.encode();
        let (tag, children) = el.as_message().unwrap();
        assert_eq!(tag, Tag::REGISTER_STAT);
        assert_eq!(RegisterStat::decode(children).unwrap(), msg);
    }

    #[test]
    fn report_stat_round_trip() {
        let msg = ReportStat {
            job_id: JobId("J1".into()),
            snapshot: TrackerSnapshot {
                kind: TrackerKind::Integer,
                display_name: "ops".into(),
                client_id: "worker-1".into(),
                thread_id: 3,
                interval_sec: 1,
                values: vec![1.0, 2.0],
                counts: vec![1, 1],
                categories: vec![],
            },
        };
        let el = msg.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(ReportStat::decode(children).unwrap(), msg);
    }
}
