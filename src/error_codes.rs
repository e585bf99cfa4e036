//! 에러 코드 상수 정의
//!
//! 호스트 UI에서 i18n 처리를 위해 에러 코드를 문자열로 반환합니다.

/// 이름 검증 실패 (빈 이름, 경로 구분자 포함 등)
pub const ERR_INVALID_NAME: &str = "ERR_INVALID_NAME";

/// 원본 경로를 찾을 수 없음
pub const ERR_NOT_FOUND: &str = "ERR_NOT_FOUND";

/// 자기 자신 또는 하위 경로로의 복사
pub const ERR_UNSAFE_OPERATION: &str = "ERR_UNSAFE_OPERATION";

/// 디스크립터 파일 읽기/쓰기 실패
pub const ERR_PERSISTENCE_FAILED: &str = "ERR_PERSISTENCE_FAILED";

/// Watch 시작 실패
pub const ERR_WATCH_START_FAILED: &str = "ERR_WATCH_START_FAILED";

/// 설정 파일 오류
pub const ERR_CONFIG_INVALID: &str = "ERR_CONFIG_INVALID";

/// 기타 I/O 오류
pub const ERR_IO: &str = "ERR_IO";
