//! MCA-3K controller family
//!
//! FPGA banks carry acquisition settings and data; ARM banks carry
//! identification and slow-control state.
//!
//! | Command          | Words | Type | Address |
//! |------------------|-------|------|---------|
//! | arm_ping         | 16    | u32  | 0       |
//! | fpga_ctrl        | 16    | u16  | 0       |
//! | fpga_statistics  | 16    | u32  | 1       |
//! | fpga_results     | 32    | u16  | 2       |
//! | fpga_histogram   | 4096  | u32  | 3       |
//! | fpga_trace       | 1024  | u16  | 4       |
//! | fpga_list_mode   | 1024  | u16  | 5       |
//! | fpga_lm_nrl1     | 12288 | u16  | 5       |
//! | fpga_weights     | 1024  | u16  | 6       |
//! | fpga_action      | 4     | u16  | 7       |
//! | fpga_time_slice  | 1024  | u16  | 8       |
//! | arm_version      | 16    | u32  | 0       |
//! | arm_status       | 16    | f32  | 1       |
//! | arm_ctrl         | 12    | f32  | 2       |
//! | arm_cal          | 64    | f32  | 3       |

pub mod action;
pub mod arm;
pub mod ctrl;
pub mod histogram;
pub mod list_mode;
pub mod results;
pub mod statistics;
pub mod time_slice;
pub mod trace;
pub mod weights;

pub use action::FpgaAction;
pub use arm::{ArmCal, ArmCtrl, ArmPing, ArmStatus, ArmVersion};
pub use ctrl::FpgaCtrl;
pub use histogram::FpgaHistogram;
pub use list_mode::{FpgaListMode, FpgaLmNrl1};
pub use results::FpgaResults;
pub use statistics::FpgaStatistics;
pub use time_slice::FpgaTimeSlice;
pub use trace::FpgaTrace;
pub use weights::FpgaWeights;

crate::invertible_maps!(FpgaCtrl, ArmCtrl);

crate::decode_only_maps!(
    ArmPing,
    FpgaAction,
    FpgaStatistics,
    FpgaResults,
    FpgaHistogram,
    FpgaListMode,
    FpgaLmNrl1,
    FpgaTrace,
    FpgaWeights,
    FpgaTimeSlice,
    ArmVersion,
    ArmStatus,
    ArmCal,
);
