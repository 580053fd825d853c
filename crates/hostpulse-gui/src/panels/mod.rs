pub mod system_monitor;
