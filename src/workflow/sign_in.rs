//! 登录流程 - 流程层
//!
//! 首页 → 等待人机验证 → Login → Sign in with Email → 填写账号密码
//! （未配置账号时提示操作员手动登录）→ 进入工作区。
//! 每个浏览器会话只登录一次。

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::DriverResult;
use crate::infrastructure::{wait_absent, wait_present, PageDriver, Target};
use crate::services::Operator;

const CLICKABLE: &str = "button, a, [role='button']";

fn verification_banner() -> Target {
    Target::containing("body *", "Verifying you are human")
        .or_css("[class*='verifying']")
        .or_css("[id*='verifying']")
}

/// 等待人机验证提示消失；没有提示或等待超时都继续
async fn wait_for_verification(driver: &dyn PageDriver, config: &Config) {
    let timeouts = config.timeouts();
    let banner = verification_banner();
    if matches!(driver.count(&banner).await, Ok(n) if n > 0) {
        info!("Human verification detected, waiting for completion...");
        match wait_absent(driver, &banner, timeouts.verification, timeouts.poll).await {
            Ok(()) => info!("✓ Verification completed"),
            Err(e) => debug!("Verification wait ended: {}", e),
        }
    }
}

/// 登录 DataLumos
///
/// # 参数
/// - `driver`: 本会话的页面驱动
/// - `config`: 站点地址、账号与超时
/// - `operator`: 未配置账号时用于手动登录的提示
pub async fn sign_in(
    driver: &dyn PageDriver,
    config: &Config,
    operator: &dyn Operator,
) -> DriverResult<()> {
    let timeouts = config.timeouts();
    let short = timeouts.interaction.min(Duration::from_secs(10));

    info!("Navigating to DataLumos home page...");
    driver.navigate(&config.site.home_url).await?;
    wait_for_verification(driver, config).await;

    let login = Target::containing(CLICKABLE, "login");
    wait_present(driver, &login, short, timeouts.poll).await?;
    driver.click(&login).await?;
    wait_for_verification(driver, config).await;

    let email = Target::containing(CLICKABLE, "sign in with email");
    wait_present(driver, &email, short, timeouts.poll).await?;
    driver.click(&email).await?;
    wait_for_verification(driver, config).await;

    match (&config.credentials.username, &config.credentials.password) {
        (Some(username), Some(password)) if config.credentials.is_complete() => {
            let user_input = Target::css("input#username").or_css("input[name='username']");
            let pass_input = Target::css("input#password").or_css("input[name='password']");
            wait_present(driver, &user_input, short, timeouts.poll).await?;
            driver.fill(&user_input, username).await?;
            driver.fill(&pass_input, password).await?;

            let submit = Target::css("input[type='submit'][value='Sign In']")
                .or_css("input.pf-c-button.btn.btn-primary[type='submit']")
                .or_press("input#password", "Enter");
            driver.click(&submit).await?;
            info!("Waiting for sign-in to complete...");
            sleep(Duration::from_secs(3)).await;
        }
        _ => {
            operator
                .confirm("MANUAL LOGIN REQUIRED: username and password not provided. Log in in the browser, then press Enter.")
                .await;
        }
    }

    info!("Navigating to workspace...");
    driver.navigate(&config.site.workspace_url).await?;
    wait_for_verification(driver, config).await;
    info!("✓ Signed in");
    Ok(())
}
