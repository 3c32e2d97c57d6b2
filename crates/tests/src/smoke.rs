use cpu_core::{CpuConfig, LockMode};

#[test]
fn workspace_smoke_cpu_core() {
    let m = crate::machine(1, CpuConfig::default());
    let mut cpu = m.cpu(0).unwrap();
    assert_eq!(cpu.ring(), 0);
    assert!(!cpu.is_running());
    cpu.acquire_memory(LockMode::Write).unwrap();
    cpu.write_word(0o10, 0o777).unwrap();
    cpu.release_memory();
    assert_eq!(cpu.read_word(0o10).unwrap(), 0o777);
}
