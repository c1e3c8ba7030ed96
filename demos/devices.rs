//! 设备管理示例 - 设备注册与分区划分
//!
//! 演示设备生命周期:
//! - 注册 SPI Flash 设备
//! - 划分多个命名分区 (偏移自动分配)
//! - 查询设备信息与分区条目
//! - 卸载设备后 ID 复用
//!
//! # 运行
//! ```bash
//! cargo run --example devices --features dev --target xtensa-esp32s3-none-elf
//! ```

#![no_std]
#![no_main]

esp_bootloader_esp_idf::esp_app_desc!();

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::timer::timg::TimerGroup;

use espstorage::{DataStorage, DeviceKind};

// ===== 条件编译日志 =====
#[cfg(feature = "dev")]
use esp_println::println;

#[cfg(not(feature = "dev"))]
macro_rules! println {
    ($($arg:tt)*) => {};
}

// ===== Panic Handler =====
#[cfg(feature = "dev")]
use esp_backtrace as _;

#[cfg(not(feature = "dev"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop { core::hint::spin_loop(); }
}

static STORAGE: DataStorage<'static> = DataStorage::new();

/// 设备管理演示任务
#[embassy_executor::task]
async fn device_demo_task() {
    println!("\n=== Device Registration ===");

    STORAGE.mkdev(0, DeviceKind::Flash).await.unwrap();
    if let Some(info) = STORAGE.device_info(0) {
        println!("device 0: status={}, type={}, capacity={} bytes",
            info.status, info.kind, info.capacity_bytes);
    }

    // 同一 ID 二次注册被拒绝
    println!("duplicate mkdev: {:?}", STORAGE.mkdev(0, DeviceKind::Flash).await.err());
    // SD 卡尚未支持
    println!("sd mkdev: {:?}", STORAGE.mkdev(1, DeviceKind::Sd).await.err());

    println!("\n=== Partition Carving ===");

    // 偏移自动分配: 每个分区紧跟前一个，大小按扇区向上对齐
    STORAGE.mkpartition(0, "sys", 0x8_0000).await.unwrap();
    STORAGE.mkpartition(0, "user", 0x10_0000).await.unwrap();
    STORAGE.mkpartition(0, "log", 0x4_2001).await.unwrap();

    for label in ["sys", "user", "log"] {
        if let Some(part) = STORAGE.partition(0, label) {
            println!("  {}: offset=0x{:X}, size=0x{:X} ({} KB)",
                part.label.as_str(), part.offset, part.size, part.size / 1024);
        }
    }

    // 标签在设备内唯一
    println!("duplicate label: {:?}",
        STORAGE.mkpartition(0, "sys", 0x1000).await.err());

    println!("\n=== Device Removal ===");

    STORAGE.rmdev(0).await.unwrap();
    println!("device 0 removed, info: {:?}", STORAGE.device_info(0).map(|i| i.status));

    // ID 在移除后可复用，分区表从头开始
    STORAGE.mkdev(0, DeviceKind::Flash).await.unwrap();
    STORAGE.mkpartition(0, "fresh", 0x1000).await.unwrap();
    if let Some(part) = STORAGE.partition(0, "fresh") {
        println!("fresh partition offset: 0x{:X}", part.offset);
    }

    println!("\nDevice demo complete!");
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    let peripherals = esp_hal::init(esp_hal::Config::default());

    println!("Device Management Example");
    println!("=========================");

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    spawner.spawn(device_demo_task()).ok();

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
