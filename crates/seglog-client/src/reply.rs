//! Reply demultiplexing.
//!
//! The server pushes replies on a connection in its own order; the transport
//! hands each decoded reply to the connection's [`ReplyProcessor`]. A
//! processor overrides only the variants its channel expects; everything
//! else lands in [`ReplyProcessor::unhandled`], which is a protocol
//! violation and must fail the enclosing operation.

use seglog_wire::{
    AppendSetup, DataAppended, NoSuchBatch, NoSuchSegment, Reply, SegmentAlreadyExists,
    SegmentCreated, SegmentIsSealed, SegmentRead, WrongHost,
};

/// Per-variant sink for replies arriving on one connection.
///
/// Methods run on a transport-owned thread and may execute concurrently
/// with public callers; implementations must only touch internally
/// synchronized state.
pub trait ReplyProcessor: Send + Sync {
    /// Dispatches a decoded reply to its variant handler.
    fn process(&self, reply: Reply) {
        match reply {
            Reply::WrongHost(r) => self.wrong_host(r),
            Reply::SegmentIsSealed(r) => self.segment_is_sealed(r),
            Reply::NoSuchSegment(r) => self.no_such_segment(r),
            Reply::NoSuchBatch(r) => self.no_such_batch(r),
            Reply::SegmentAlreadyExists(r) => self.segment_already_exists(r),
            Reply::SegmentCreated(r) => self.segment_created(r),
            Reply::AppendSetup(r) => self.append_setup(r),
            Reply::DataAppended(r) => self.data_appended(r),
            Reply::SegmentRead(r) => self.segment_read(r),
        }
    }

    fn wrong_host(&self, reply: WrongHost) {
        self.unhandled(Reply::WrongHost(reply));
    }

    fn segment_is_sealed(&self, reply: SegmentIsSealed) {
        self.unhandled(Reply::SegmentIsSealed(reply));
    }

    fn no_such_segment(&self, reply: NoSuchSegment) {
        self.unhandled(Reply::NoSuchSegment(reply));
    }

    fn no_such_batch(&self, reply: NoSuchBatch) {
        self.unhandled(Reply::NoSuchBatch(reply));
    }

    fn segment_already_exists(&self, reply: SegmentAlreadyExists) {
        self.unhandled(Reply::SegmentAlreadyExists(reply));
    }

    fn segment_created(&self, reply: SegmentCreated) {
        self.unhandled(Reply::SegmentCreated(reply));
    }

    fn append_setup(&self, reply: AppendSetup) {
        self.unhandled(Reply::AppendSetup(reply));
    }

    fn data_appended(&self, reply: DataAppended) {
        self.unhandled(Reply::DataAppended(reply));
    }

    fn segment_read(&self, reply: SegmentRead) {
        self.unhandled(Reply::SegmentRead(reply));
    }

    /// Called for every reply variant the implementor did not override.
    ///
    /// Receiving one means the server broke the protocol for this channel;
    /// the implementation must fail the enclosing operation with
    /// [`ClientError::ProtocolViolation`](crate::ClientError::ProtocolViolation).
    fn unhandled(&self, reply: Reply);

    /// Called once when the connection is lost without a deliberate
    /// `close()`. No further replies will be delivered.
    fn connection_dropped(&self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use seglog_types::{SegmentName, WriterId};

    use super::*;

    /// Overrides nothing: every reply must fall through to `unhandled`.
    struct FailingOnly {
        seen: Mutex<Vec<&'static str>>,
    }

    impl ReplyProcessor for FailingOnly {
        fn unhandled(&self, reply: Reply) {
            self.seen.lock().unwrap().push(reply.kind());
        }
    }

    /// Overrides one variant; only the rest fall through.
    struct AcksOnly {
        acks: Mutex<Vec<u64>>,
        unexpected: Mutex<Vec<&'static str>>,
    }

    impl ReplyProcessor for AcksOnly {
        fn data_appended(&self, reply: DataAppended) {
            self.acks.lock().unwrap().push(reply.ack_level);
        }

        fn unhandled(&self, reply: Reply) {
            self.unexpected.lock().unwrap().push(reply.kind());
        }
    }

    fn sealed_reply() -> Reply {
        Reply::SegmentIsSealed(SegmentIsSealed {
            segment: SegmentName::new("s1"),
        })
    }

    fn ack_reply(level: u64) -> Reply {
        Reply::DataAppended(DataAppended {
            writer_id: WriterId::mint(),
            ack_level: level,
        })
    }

    #[test]
    fn base_contract_routes_everything_to_unhandled() {
        let processor = FailingOnly {
            seen: Mutex::new(Vec::new()),
        };

        processor.process(sealed_reply());
        processor.process(ack_reply(4));
        processor.process(Reply::SegmentCreated(SegmentCreated {
            segment: SegmentName::new("s1"),
        }));

        assert_eq!(
            *processor.seen.lock().unwrap(),
            vec!["SegmentIsSealed", "DataAppended", "SegmentCreated"]
        );
    }

    #[test]
    fn overridden_variant_bypasses_unhandled() {
        let processor = AcksOnly {
            acks: Mutex::new(Vec::new()),
            unexpected: Mutex::new(Vec::new()),
        };

        processor.process(ack_reply(3));
        processor.process(ack_reply(8));
        processor.process(sealed_reply());

        assert_eq!(*processor.acks.lock().unwrap(), vec![3, 8]);
        assert_eq!(*processor.unexpected.lock().unwrap(), vec!["SegmentIsSealed"]);
    }

    #[test]
    fn dispatch_preserves_payloads() {
        struct CaptureRead {
            data: Mutex<Option<Bytes>>,
        }

        impl ReplyProcessor for CaptureRead {
            fn segment_read(&self, reply: SegmentRead) {
                *self.data.lock().unwrap() = Some(reply.data);
            }

            fn unhandled(&self, _reply: Reply) {
                panic!("unexpected reply");
            }
        }

        let processor = CaptureRead {
            data: Mutex::new(None),
        };
        processor.process(Reply::SegmentRead(SegmentRead {
            segment: SegmentName::new("s1"),
            offset: 0,
            end_of_segment: false,
            data: Bytes::from_static(b"chunk"),
        }));

        assert_eq!(
            processor.data.lock().unwrap().as_deref(),
            Some(&b"chunk"[..])
        );
    }
}
