use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    secure_usb::run().await
}
