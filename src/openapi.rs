use crate::models::{
    Campaign, CampaignStatus, NewCampaign, NewPet, NewReport, Pet, PetKind, PetStatus, Report,
    ReportSnapshot, TargetType,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_pets,
        crate::routes::create_pet,
        crate::routes::list_campaigns,
        crate::routes::create_campaign,
        crate::routes::list_reports,
        crate::routes::create_report,
        crate::routes::upload_pet_image,
        crate::routes::upload_campaign_image,
        crate::routes::status,
    ),
    components(schemas(
        Pet, NewPet, PetKind, PetStatus,
        Campaign, NewCampaign, CampaignStatus,
        Report, NewReport, ReportSnapshot, TargetType,
        crate::routes::CreatedResponse, crate::routes::UploadResponse, crate::routes::StatusResponse
    )),
    tags(
        (name = "pets", description = "Lost, found and adoptable pets"),
        (name = "campaigns", description = "Fundraising campaigns"),
        (name = "reports", description = "Community reports and cases"),
    )
)]
pub struct ApiDoc;
