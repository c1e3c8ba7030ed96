//! 存储示例 - 多任务并发文件操作
//!
//! 演示存储层的完整使用流程:
//! - 设备注册与分区划分
//! - 卷挂载
//! - 两个写入任务并发追加同一文件 (闸门串行化)
//! - 监控任务列举目录、读取并清理
//!
//! # 运行
//! ```bash
//! cargo run --example storage --features dev --target xtensa-esp32s3-none-elf
//! ```

#![no_std]
#![no_main]

esp_bootloader_esp_idf::esp_app_desc!();

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use espstorage::volume::{RamVolume, VolumeMount};
use espstorage::{DataStorage, DeviceKind, ReadOutcome, StorageError};

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

// ===== 静态分配 =====
static STORAGE: DataStorage<'static> = DataStorage::new();
static MOUNT: StaticCell<VolumeMount<'static, RamVolume>> = StaticCell::new();

const LOG_FILE: &str = "/boot_log.txt";

/// 写入任务: 周期性向日志文件追加一行
#[embassy_executor::task(pool_size = 2)]
async fn writer_task(mount: &'static VolumeMount<'static, RamVolume>, payload: &'static str) {
    for _ in 0..10 {
        match mount.append(LOG_FILE, payload.as_bytes()).await {
            Ok(()) => println!("[writer] appended: {}", payload),
            // 闸门被占用时跳过本轮，下个周期重试
            Err(StorageError::Busy) => println!("[writer] storage busy, retrying later"),
            Err(e) => println!("[writer] append failed: {}", e),
        }
        Timer::after(Duration::from_millis(100)).await;
    }
    println!("[writer] done: {}", payload);
}

/// 监控任务: 延迟后检查文件并清理
#[embassy_executor::task]
async fn monitor_task(mount: &'static VolumeMount<'static, RamVolume>) {
    Timer::after(Duration::from_secs(2)).await;

    println!("\n=== Directory listing ===");
    if let Err(e) = mount.listdir("/", 2).await {
        println!("[monitor] listdir failed: {}", e);
    }

    match mount.fsize(LOG_FILE).await {
        Ok(size) => println!("[monitor] {} size: {} bytes", LOG_FILE, size),
        Err(e) => println!("[monitor] fsize failed: {}", e),
    }

    // 逐行读取: 以 '\n' 为终止符，读完一行推进偏移
    let mut buf = [0u8; 64];
    let mut pos: u32 = 0;
    loop {
        match mount.read(LOG_FILE, &mut buf, Some(b'\n'), pos).await {
            Ok(ReadOutcome::Terminator(len)) => {
                if let Ok(line) = core::str::from_utf8(&buf[..len]) {
                    println!("[monitor] line: {}", line);
                }
                pos += len as u32 + 1;
            }
            Ok(ReadOutcome::Eof(len)) => {
                if len > 0 {
                    println!("[monitor] trailing {} bytes without terminator", len);
                }
                break;
            }
            Err(e) => {
                println!("[monitor] read failed: {}", e);
                break;
            }
        }
    }

    match mount.rm(LOG_FILE).await {
        Ok(()) => println!("[monitor] log file removed"),
        Err(e) => println!("[monitor] rm failed: {}", e),
    }
    println!("[monitor] file exists after rm: {:?}", mount.exists(LOG_FILE).await);
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    let peripherals = esp_hal::init(esp_hal::Config::default());

    println!("Storage Example");
    println!("===============");

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // 设备与分区
    STORAGE.mkdev(0, DeviceKind::Flash).await.unwrap();
    STORAGE.mkpartition(0, "user", 0x10_0000).await.unwrap();
    if let Some(part) = STORAGE.partition(0, "user") {
        println!("partition user: offset=0x{:X}, size=0x{:X}", part.offset, part.size);
    }

    // 挂载卷并确保日志文件存在
    let mount = MOUNT.init(
        STORAGE
            .mount(RamVolume::new(), "/data", true)
            .await
            .unwrap(),
    );
    mount.mkfile(LOG_FILE).await.unwrap();
    println!("volume mounted at {}", mount.base_path());

    spawner.spawn(writer_task(mount, "hello from task A")).ok();
    spawner.spawn(writer_task(mount, "hello from task B")).ok();
    spawner.spawn(monitor_task(mount)).ok();

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
