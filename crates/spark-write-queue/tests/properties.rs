mod support;

use proptest::prelude::*;
use spark_write_queue::{AsyncQueueWriter, WriteQueueConfig};

use support::{ManualReactor, MockSocket, connection};

#[derive(Clone, Debug)]
enum Op {
    /// 在暂停的连接上写入若干字节。
    Write(usize),
    /// 恢复连接并排空，直到写出不少于若干字节或队列为空，然后再次暂停。
    Drain(usize),
    /// 运行时调整上限，`<= 0` 表示不限制。
    SetLimit(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1usize..512).prop_map(Op::Write),
        2 => (1usize..1_024).prop_map(Op::Drain),
        1 => (-64i64..2_048).prop_map(Op::SetLimit),
    ]
}

fn admits(limit: i64, pending: usize, additional: usize) -> bool {
    limit <= 0 || pending as i128 + additional as i128 <= limit as i128
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `can_write` 与 `write` 的接受判定始终等价于 `space + n <= limit`，
    /// 且 `space_in_bytes` 恒等于已接受字节减去已写出字节。
    #[test]
    fn backpressure_matches_pending_byte_model(
        initial_limit in -8i64..2_048,
        ops in prop::collection::vec(op(), 1..64),
    ) {
        let socket = MockSocket::with_chunk_limit(128);
        let reactor = ManualReactor::new();
        let connection = connection(&socket, &reactor);
        let writer = AsyncQueueWriter::new(
            WriteQueueConfig::new().with_max_pending_bytes_per_connection(initial_limit),
        );
        connection.pause();

        let mut limit = initial_limit;
        let mut accepted = 0usize;
        for op in ops {
            match op {
                Op::Write(size) => {
                    let pending = accepted - socket.wire().len();
                    let expected = admits(limit, pending, size);
                    prop_assert_eq!(writer.can_write(&connection, size), expected);
                    let result = writer.write(&connection, vec![0u8; size], None, None);
                    prop_assert_eq!(result.is_ok(), expected);
                    if let Err(error) = result {
                        prop_assert!(error.is_limit_exceeded());
                    } else {
                        accepted += size;
                    }
                }
                Op::Drain(budget) => {
                    let before = socket.wire().len();
                    connection.resume();
                    while socket.wire().len() - before < budget {
                        if writer.on_writable(&connection).unwrap_or(0) == 0 {
                            break;
                        }
                    }
                    connection.pause();
                }
                Op::SetLimit(next) => {
                    writer.set_max_pending_bytes_per_connection(next);
                    limit = next;
                }
            }
            prop_assert_eq!(
                connection.queue().space_in_bytes(),
                accepted - socket.wire().len()
            );
        }
    }
}
