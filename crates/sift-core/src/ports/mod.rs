//! Ports - 外部コラボレータへの抽象化レイヤー
//!
//! コアが外から受け取る能力（時刻、ID 生成）を trait として定義します。
//! キューは可視時刻とバックオフの判定に注入された Clock を使います。
//! テストでは ManualClock / FixedClock や失敗する IdGenerator に差し替えられます。
//! （created_at / updated_at は記録用の実時刻のまま）

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
