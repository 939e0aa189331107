#[cfg(unix)]
mod unix {
    use std::{
        fs,
        path::{Path, PathBuf},
        process::Command,
        time::Duration,
    };

    use claude_sdk::{
        CancellationToken, ClaudeClient, ClaudeError, Message, MessageStream, QueryOptions,
    };
    use futures_util::StreamExt;
    use tempfile::TempDir;

    const SYSTEM_LINE: &str = r#"{"type":"system","subtype":"init","session_id":"s","tools":["Read"],"model":"claude-sonnet","permissionMode":"default"}"#;
    const ASSISTANT_LINE: &str =
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hi"}]},"session_id":"s"}"#;
    const RESULT_LINE: &str =
        r#"{"type":"result","subtype":"success","is_error":false,"num_turns":1,"result":"Hi","session_id":"s"}"#;

    fn fake_claude(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script_path = dir.join("fake-claude");
        fs::write(&script_path, format!("#!/bin/sh\nset -eu\n{body}")).expect("write script");
        let mut perms = fs::metadata(&script_path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).expect("chmod");
        script_path
    }

    fn process_alive(pid: &str) -> bool {
        Command::new("kill")
            .args(["-0", pid])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn wait_for_exit(pid: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while process_alive(pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("process {pid} still running"));
    }

    async fn hung_stream(dir: &TempDir) -> (MessageStream, CancellationToken, String) {
        let pid_file = dir.path().join("pid.txt");
        let script = fake_claude(
            dir.path(),
            &format!(
                r#"cat > /dev/null
echo $$ > "$PID_FILE"
echo '{SYSTEM_LINE}'
exec sleep 30
"#
            ),
        );
        let client = ClaudeClient::builder()
            .binary(&script)
            .env("PID_FILE", pid_file.to_string_lossy())
            .build();
        let cancel = CancellationToken::new();
        let mut stream = client
            .query_stream(&cancel, "hi", &QueryOptions::new())
            .await
            .expect("stream");

        let first = stream.next_message().await.expect("first item");
        assert_eq!(first.expect("system message").message_type(), "system");

        let pid = fs::read_to_string(&pid_file).expect("pid file");
        (stream, cancel, pid.trim().to_string())
    }

    #[tokio::test]
    async fn messages_arrive_in_output_order() {
        let dir = TempDir::new().expect("temp dir");
        let script = fake_claude(
            dir.path(),
            &format!(
                r#"if [ "$*" != "--print --output-format stream-json --verbose --model claude-sonnet" ]; then
  echo "unexpected args: $*" >&2
  exit 9
fi
cat > /dev/null
echo '{SYSTEM_LINE}'
echo ''
echo '{ASSISTANT_LINE}'
printf '%s\r\n' '{RESULT_LINE}'
"#
            ),
        );

        let client = ClaudeClient::builder().binary(&script).build();
        let mut stream = client
            .query_stream(
                &CancellationToken::new(),
                "hi",
                &QueryOptions::new().model("claude-sonnet"),
            )
            .await
            .expect("stream");

        let mut kinds = Vec::new();
        while let Some(item) = stream.next_message().await {
            kinds.push(item.expect("message").message_type());
        }
        assert_eq!(kinds, ["system", "assistant", "result"]);
    }

    #[tokio::test]
    async fn long_streams_keep_line_order() {
        let dir = TempDir::new().expect("temp dir");
        let script = fake_claude(
            dir.path(),
            r#"cat > /dev/null
i=0
while [ "$i" -lt 200 ]; do
  echo "{\"type\":\"assistant\",\"session_id\":\"$i\"}"
  i=$((i + 1))
done
"#,
        );

        let client = ClaudeClient::builder().binary(&script).build();
        let stream = client
            .query_stream(&CancellationToken::new(), "hi", &QueryOptions::new())
            .await
            .expect("stream");

        let sessions: Vec<String> = stream
            .map(|item| item.expect("message").session_id().to_string())
            .collect()
            .await;
        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(sessions, expected);
    }

    #[tokio::test]
    async fn malformed_line_ends_the_stream_with_one_error() {
        let dir = TempDir::new().expect("temp dir");
        let script = fake_claude(
            dir.path(),
            &format!(
                r#"cat > /dev/null
echo '{ASSISTANT_LINE}'
echo '{{invalid json}}'
echo '{RESULT_LINE}'
"#
            ),
        );

        let client = ClaudeClient::builder().binary(&script).build();
        let stream = client
            .query_stream(&CancellationToken::new(), "hi", &QueryOptions::new())
            .await
            .expect("stream");

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(Message::Assistant(_))));
        match &items[1] {
            Err(ClaudeError::Parse(err)) => assert_eq!(err.line, "{invalid json}"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_after_output_is_the_final_item() {
        let dir = TempDir::new().expect("temp dir");
        let script = fake_claude(
            dir.path(),
            &format!(
                r#"cat > /dev/null
echo '{RESULT_LINE}'
echo boom >&2
exit 3
"#
            ),
        );

        let client = ClaudeClient::builder().binary(&script).build();
        let stream = client
            .query_stream(&CancellationToken::new(), "hi", &QueryOptions::new())
            .await
            .expect("stream");

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(Message::Result(_))));
        match &items[1] {
            Err(ClaudeError::Process(err)) => {
                assert_eq!(err.exit_code, 3);
                assert!(err.message.contains("boom"), "{}", err.message);
            }
            other => panic!("expected process error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_reaps_a_running_child() {
        let dir = TempDir::new().expect("temp dir");
        let (stream, _cancel, pid) = hung_stream(&dir).await;

        tokio::time::timeout(Duration::from_secs(5), stream.shutdown())
            .await
            .expect("shutdown finishes");
        wait_for_exit(&pid).await;
    }

    #[tokio::test]
    async fn dropping_the_stream_reaps_the_child() {
        let dir = TempDir::new().expect("temp dir");
        let (stream, _cancel, pid) = hung_stream(&dir).await;

        drop(stream);
        wait_for_exit(&pid).await;
    }

    #[tokio::test]
    async fn cancelling_the_caller_token_ends_the_stream() {
        let dir = TempDir::new().expect("temp dir");
        let (mut stream, cancel, pid) = hung_stream(&dir).await;

        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next_message())
            .await
            .expect("stream ends after cancellation");
        assert!(next.is_none());
        assert!(stream.is_closed());
        wait_for_exit(&pid).await;
    }

    #[tokio::test]
    async fn unread_prompt_does_not_delay_the_stream_or_its_cancellation() {
        let dir = TempDir::new().expect("temp dir");
        let pid_file = dir.path().join("pid.txt");
        let script = fake_claude(
            dir.path(),
            r#"echo $$ > "$PID_FILE"
exec sleep 30
"#,
        );
        let client = ClaudeClient::builder()
            .binary(&script)
            .env("PID_FILE", pid_file.to_string_lossy())
            .build();
        let cancel = CancellationToken::new();
        let prompt = "x".repeat(1 << 20);

        let mut stream = tokio::time::timeout(
            Duration::from_secs(5),
            client.query_stream(&cancel, &prompt, &QueryOptions::new()),
        )
        .await
        .expect("stream starts without draining stdin")
        .expect("stream");

        let pid = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match fs::read_to_string(&pid_file) {
                    Ok(pid) if !pid.trim().is_empty() => return pid.trim().to_string(),
                    _ => tokio::time::sleep(Duration::from_millis(20)).await,
                }
            }
        })
        .await
        .expect("pid file");

        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next_message())
            .await
            .expect("stream ends after cancellation");
        assert!(next.is_none());
        wait_for_exit(&pid).await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let (mut stream, cancel, pid) = hung_stream(&dir).await;

        stream.close();
        stream.close();
        assert!(stream.next_message().await.is_none());
        assert!(!cancel.is_cancelled());
        wait_for_exit(&pid).await;
    }

    #[tokio::test]
    async fn spawn_failure_is_returned_before_streaming() {
        let dir = TempDir::new().expect("temp dir");
        let client = ClaudeClient::builder()
            .binary(dir.path().join("no-such-claude"))
            .build();

        let err = client
            .query_stream(&CancellationToken::new(), "hi", &QueryOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClaudeError::Spawn { .. }), "{err:?}");
    }
}
