pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGSYNC CONFIGURATION
# =============================================================================
# One file configures every role. Each subcommand reads only its own section:
#
#   logsync ship      -> shipper:   tail an nginx access log and POST it upstream
#   logsync ingest    -> ingestor:  receive batches and append to bucket files
#   logsync monitor   -> monitor:   freshness alerts and the hourly rollup
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logsync/config.yml
#   3. /etc/logsync/config.yml
#   4. ./config.yml
#
# Values may reference environment variables as $env{NAME}.

# =============================================================================
# SHIPPER
# =============================================================================
shipper:
  log_file: /app/log/nginx/access.log
  # Plain-text byte offset; the file identity is stored next to it as <file>.id
  offset_file: /app/log/nginx/log-shipper/latest.offset
  # Maximum number of lines sent per request
  chunk_size: 10000
  receiver_url: http://127.0.0.1:5000/upload
  # Quiet period after the last change before a chunk is shipped
  debounce: 1s
  # How often the log file is checked for changes
  poll_interval: 1s
  retry_attempts: 600
  retry_wait: 6s
  request_timeout: 30s
  # Lines containing every marker are treated as health-check noise
  noise_markers:
    - /health.php
    - nginx/
    - health check

# =============================================================================
# INGESTOR
# =============================================================================
ingestor:
  base_dir: /app/log/access-log-reciever/
  listen: 0.0.0.0:5000
  file_prefix: MyGP_accessLog
  # Inclusive minute ranges; the first match names the bucket window
  time_windows:
    - { start: 0, end: 19, label: "00-19" }
    - { start: 20, end: 39, label: "20-39" }
    - { start: 40, end: 59, label: "40-59" }
  # Used when a minute matches no window above
  fallback_window: "00-59"
  fsync: true

# =============================================================================
# MONITOR
# =============================================================================
monitor:
  log_base_dir: /app/log/access-log-reciever/
  status_file: /var/lib/logsync/receiver_status.json
  report_file: /var/log/logsync/receiver_status_report.log
  linecount_file: /var/log/logsync/linecount-report.log
  hour_state_file: /var/lib/logsync/last_hour_state.json
  # An origin whose newest file is older than this is inactive
  threshold: 5m
  file_prefix: MyGP_accessLog
  email:
    smtp_host: localhost
    smtp_port: 25
    from_address: noreply@localhost
    recipients:
      - admin@localhost
    subject_prefix: "[Log Monitor]"
    timeout: 15s
  hourly_summary:
    enabled: true
    # The previous hour is summarised once the clock passes HH:<send_after_minutes>
    send_after_minutes: 15

# =============================================================================
# LOGGING
# =============================================================================
logging:
  # Overridden by RUST_LOG when set
  level: info
  # file: /var/log/logsync/logsync.log
"#
    .to_string()
}
