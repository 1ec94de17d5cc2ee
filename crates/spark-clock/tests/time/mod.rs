//! 时间相关集成测试入口，验证虚拟时钟在跨线程推进、定时器重置与 `wait_advance` 下的可观测契约。
//!
//! # 结构概览（What）
//! - [`tests::time::mock_clock_scenarios`]：超时触发、定时器 stop/reset、`wait_advance` 三个端到端场景；
//! - [`tests::time::injected_clock`]：以 `Arc<dyn Clock>` 注入虚拟时钟，驱动一个最小的“带截止时间的工作者”。
//!
//! # 维护提示（How）
//! - 新增时间相关集成测试时，在此处增加子模块并通过 `include!` 引入；
//! - 所有等待均使用 `recv_timeout` 设定真实时间上限，避免失败时挂起 CI。

pub mod tests {
    //! 集成测试命名空间：将所有时间相关测试归档在 `tests::time` 之下，便于过滤。
    pub mod time {
        include!("mock_clock_scenarios.rs");
        include!("injected_clock.rs");
    }
}
