//! 메트릭 상수 및 설명 등록
//!
//! 하네스가 기록하는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 레코더가 설치되지 않은 경우 `metrics` 매크로는 아무 일도 하지 않으므로
//! 라이브러리 사용자는 원할 때만 익스포터를 연결하면 됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `infraprobe_`
//! - 영역: `process_`, `lifecycle_`, `assertion_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(infraprobe_core::metrics::PROCESS_INVOCATIONS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 라이프사이클 단계 레이블 키 (init, plan, apply, output, destroy)
pub const LABEL_STEP: &str = "step";

/// 결과 레이블 키 (success, failure, error)
pub const LABEL_RESULT: &str = "result";

/// 실행 파일 레이블 키
pub const LABEL_PROGRAM: &str = "program";

// ─── Process Runner 메트릭 ─────────────────────────────────────────

/// Process: 외부 프로세스 실행 횟수 (counter, label: program, result)
pub const PROCESS_INVOCATIONS_TOTAL: &str = "infraprobe_process_invocations_total";

/// Process: 외부 프로세스 실행 시간 (histogram, 초)
pub const PROCESS_DURATION_SECONDS: &str = "infraprobe_process_duration_seconds";

/// Process: 제한 시간 초과로 종료된 횟수 (counter)
pub const PROCESS_TIMEOUTS_TOTAL: &str = "infraprobe_process_timeouts_total";

// ─── Lifecycle 메트릭 ──────────────────────────────────────────────

/// Lifecycle: 단계 실행 횟수 (counter, label: step, result)
pub const LIFECYCLE_STEPS_TOTAL: &str = "infraprobe_lifecycle_steps_total";

/// Lifecycle: 재시도 횟수 (counter, label: step)
pub const LIFECYCLE_RETRIES_TOTAL: &str = "infraprobe_lifecycle_retries_total";

/// Lifecycle: destroy 실패 횟수 (counter)
pub const LIFECYCLE_CLEANUP_FAILURES_TOTAL: &str = "infraprobe_lifecycle_cleanup_failures_total";

// ─── Assertion 메트릭 ──────────────────────────────────────────────

/// Assertion: 불충족된 기대 조건 수 (counter)
pub const ASSERTION_FAILURES_TOTAL: &str = "infraprobe_assertion_failures_total";

/// 결과 레이블 값
pub const RESULT_SUCCESS: &str = "success";
/// 결과 레이블 값
pub const RESULT_FAILURE: &str = "failure";
/// 결과 레이블 값 (프로세스 실행 자체 실패)
pub const RESULT_ERROR: &str = "error";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    // Process Runner
    describe_counter!(
        PROCESS_INVOCATIONS_TOTAL,
        "Total number of external process invocations"
    );
    describe_histogram!(
        PROCESS_DURATION_SECONDS,
        "External process wall-clock duration in seconds"
    );
    describe_counter!(
        PROCESS_TIMEOUTS_TOTAL,
        "External processes killed after exceeding the step timeout"
    );

    // Lifecycle
    describe_counter!(
        LIFECYCLE_STEPS_TOTAL,
        "Lifecycle steps executed, by step and result"
    );
    describe_counter!(
        LIFECYCLE_RETRIES_TOTAL,
        "Lifecycle step retries after a retryable error"
    );
    describe_counter!(
        LIFECYCLE_CLEANUP_FAILURES_TOTAL,
        "Destroy steps that failed during cleanup"
    );

    // Assertion
    describe_counter!(
        ASSERTION_FAILURES_TOTAL,
        "Expectations that were not met"
    );
}
