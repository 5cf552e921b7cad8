use futures_lite::StreamExt as _;

use super::*;

async fn collect(bytes: &'static [u8]) -> Vec<String> {
    LineReader::new("test", bytes).into_stream().collect().await
}

#[tokio::test]
async fn splits_lines() {
    assert_eq!(
        collect(b"first\nsecond\nthird\n").await,
        vec!["first", "second", "third"]
    );
}

#[tokio::test]
async fn strips_carriage_returns() {
    assert_eq!(collect(b"one\r\ntwo\r\n").await, vec!["one", "two"]);
}

#[tokio::test]
async fn delivers_unterminated_last_line() {
    assert_eq!(collect(b"one\ntwo").await, vec!["one", "two"]);
}

#[tokio::test]
async fn keeps_empty_lines() {
    assert_eq!(collect(b"one\n\ntwo\n").await, vec!["one", "", "two"]);
}

#[tokio::test]
async fn skips_invalid_utf8_and_continues() {
    assert_eq!(
        collect(b"before\n\xff\xfe broken\nafter\n").await,
        vec!["before", "after"]
    );
}

#[tokio::test]
async fn decodes_multibyte_text() {
    assert_eq!(collect("♪ 歌词\n".as_bytes()).await, vec!["♪ 歌词"]);
}

#[tokio::test]
async fn empty_source_ends_immediately() {
    let mut reader = LineReader::new("test", &b""[..]);
    assert_eq!(reader.next_line().await, None);
    assert_eq!(reader.next_line().await, None);
}

#[tokio::test]
async fn pull_one_at_a_time() {
    let mut reader = LineReader::new("test", &b"a\nb\n"[..]);
    assert_eq!(reader.next_line().await.as_deref(), Some("a"));
    assert_eq!(reader.next_line().await.as_deref(), Some("b"));
    assert_eq!(reader.next_line().await, None);
}

async fn collect_limited(bytes: &'static [u8], max_line_length: usize) -> Vec<String> {
    let mut reader = LineReader::new("test", bytes);
    reader.max_line_length = max_line_length;
    reader.into_stream().collect().await
}

#[tokio::test]
async fn skips_oversized_lines() {
    assert_eq!(
        collect_limited(b"short\nthis line is far too long\nafter\n", 8).await,
        vec!["short", "after"]
    );
}

#[tokio::test]
async fn line_at_the_limit_is_kept() {
    assert_eq!(
        collect_limited(b"12345678\n123456789\nok\n", 8).await,
        vec!["12345678", "ok"]
    );
}

#[tokio::test]
async fn unterminated_flood_ends_the_stream() {
    let flood: &'static [u8] = Box::leak(vec![b'x'; 1000].into_boxed_slice());
    let mut reader = LineReader::new("test", flood);
    reader.max_line_length = 16;
    assert_eq!(reader.next_line().await, None);
    assert!(reader.buf.capacity() < 100);
}
