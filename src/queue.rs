//! Queue access: a blocking pop with a bounded wait.
//!
//! The worker only needs "give me the next message, or tell me there is none
//! yet". [`MessageQueue`] captures that so the consumer loop can be driven by
//! Redis in production and by an in-memory queue in tests.

use std::{future::Future, time::Duration};

use redis::aio::MultiplexedConnection;
use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// FIFO source of raw JSON messages.
pub trait MessageQueue {
    /// Pop the next message, waiting at most `wait`.
    ///
    /// `Ok(None)` means the wait window elapsed with nothing queued. The body
    /// comes back as raw bytes; judging its contents is the caller's job.
    fn pop(&mut self, wait: Duration) -> impl Future<Output = Result<Option<Vec<u8>>, QueueError>> + Send;
}

/// Redis list consumed with `BLPOP`.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
    key: String,
}

impl RedisQueue {
    // ---
    /// Connect and `PING` so an unreachable Redis fails at startup.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, QueueError> {
        // ---
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::debug!(reply = %pong, "Redis answered PING");

        Ok(RedisQueue {
            conn,
            key: key.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl MessageQueue for RedisQueue {
    async fn pop(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        // ---
        // BLPOP replies nil on timeout, otherwise [key, value]. The value is
        // already off the list, so it is taken as bytes and never rejected here.
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(&self.key)
            .arg(wait.as_secs().max(1))
            .query_async(&mut self.conn)
            .await?;

        Ok(reply.map(|(_key, value)| value))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    const KEY: &str = "weather_data_queue";

    /// Nil array, what BLPOP answers when the wait elapses.
    const NIL: &[u8] = b"*-1\r\n";

    /// BLPOP reply carrying `value` popped from `key`.
    fn popped(key: &str, value: &[u8]) -> Vec<u8> {
        let mut reply = format!("*2\r\n${}\r\n{}\r\n${}\r\n", key.len(), key, value.len()).into_bytes();
        reply.extend_from_slice(value);
        reply.extend_from_slice(b"\r\n");
        reply
    }

    async fn read_command<R: AsyncBufRead + Unpin>(rd: &mut R) -> Option<Vec<String>> {
        // ---
        let mut line = String::new();
        if rd.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            rd.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0; len + 2];
            rd.read_exact(&mut buf).await.ok()?;
            buf.truncate(len);
            args.push(String::from_utf8_lossy(&buf).into_owned());
        }
        Some(args)
    }

    /// Single-connection RESP server. PING gets PONG, each BLPOP gets the
    /// next scripted reply (nil once the script runs out), anything else +OK.
    /// Returns the URL and the arguments of every BLPOP received.
    async fn fake_redis(replies: Vec<Vec<u8>>) -> (String, Arc<Mutex<Vec<Vec<String>>>>) {
        // ---
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut replies: VecDeque<Vec<u8>> = replies.into();
            let (stream, _) = listener.accept().await.unwrap();
            let (rd, mut wr) = stream.into_split();
            let mut rd = BufReader::new(rd);

            while let Some(args) = read_command(&mut rd).await {
                let name = args.first().map(|a| a.to_ascii_uppercase());
                let reply = match name.as_deref() {
                    Some("PING") => b"+PONG\r\n".to_vec(),
                    Some("BLPOP") => {
                        log.lock().unwrap().push(args[1..].to_vec());
                        replies.pop_front().unwrap_or_else(|| NIL.to_vec())
                    }
                    _ => b"+OK\r\n".to_vec(),
                };
                if wr.write_all(&reply).await.is_err() {
                    break;
                }
            }
        });

        (format!("redis://{}/", addr), seen)
    }

    #[tokio::test]
    async fn test_nil_reply_is_no_work_yet() {
        // ---
        let (url, seen) = fake_redis(vec![NIL.to_vec()]).await;
        let mut queue = RedisQueue::connect(&url, KEY).await.unwrap();

        assert_eq!(queue.key(), KEY);
        assert!(queue.pop(Duration::from_secs(30)).await.unwrap().is_none());
        assert_eq!(seen.lock().unwrap()[0][0], KEY);
    }

    #[tokio::test]
    async fn test_popped_value_is_returned_as_is() {
        // ---
        let body = br#"{"city":"Lisbon"}"#;
        let (url, _) = fake_redis(vec![popped(KEY, body)]).await;
        let mut queue = RedisQueue::connect(&url, KEY).await.unwrap();

        let got = queue.pop(Duration::from_secs(30)).await.unwrap();
        assert_eq!(got.as_deref(), Some(&body[..]));
    }

    #[tokio::test]
    async fn test_non_utf8_value_is_not_a_queue_error() {
        // ---
        let (url, _) = fake_redis(vec![popped(KEY, b"\xff\xfe{")]).await;
        let mut queue = RedisQueue::connect(&url, KEY).await.unwrap();

        let got = queue.pop(Duration::from_secs(30)).await.unwrap();
        assert_eq!(got, Some(b"\xff\xfe{".to_vec()));
    }

    #[tokio::test]
    async fn test_wait_is_sent_in_whole_seconds_never_zero() {
        // ---
        let (url, seen) = fake_redis(vec![]).await;
        let mut queue = RedisQueue::connect(&url, KEY).await.unwrap();

        for wait in [200, 1500, 30_000] {
            let got = queue.pop(Duration::from_millis(wait)).await.unwrap();
            assert!(got.is_none());
        }

        let timeouts: Vec<String> = seen.lock().unwrap().iter().map(|args| args[1].clone()).collect();
        assert_eq!(timeouts, ["1", "1", "30"]);
    }
}
